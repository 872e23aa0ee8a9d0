// objective.rs - Objective: the time-boxed top level of the goal hierarchy.
//
// An Objective owns a set of KeyResults. Its `progress` and `status` are
// derived values: only the ProgressPropagator writes them, from the
// KeyResults' progress and the position of "now" inside the time box.
//
// Status lifecycle:
//   Draft / Active ⇄ AtRisk → Completed
//   (Cancelled is set by the caller; Completed and Cancelled are terminal)

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GoalError;

/// Lifecycle status of an Objective.
///
/// The same field carries both the lifecycle phase (draft, active) and the
/// health signal (at risk).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStatus {
    /// Defined but not yet committed to.
    Draft,
    /// In flight and on track.
    Active,
    /// Behind the time-weighted expectation near the end of the period.
    AtRisk,
    /// Reached 100% progress. Terminal.
    Completed,
    /// Abandoned by the owner. Terminal.
    Cancelled,
}

impl ObjectiveStatus {
    /// Completed and Cancelled never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ObjectiveStatus::Completed | ObjectiveStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectiveStatus::Draft => "draft",
            ObjectiveStatus::Active => "active",
            ObjectiveStatus::AtRisk => "at_risk",
            ObjectiveStatus::Completed => "completed",
            ObjectiveStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ObjectiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectiveStatus {
    type Err = GoalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "draft" => Ok(ObjectiveStatus::Draft),
            "active" => Ok(ObjectiveStatus::Active),
            "at_risk" => Ok(ObjectiveStatus::AtRisk),
            "completed" => Ok(ObjectiveStatus::Completed),
            "cancelled" => Ok(ObjectiveStatus::Cancelled),
            other => Err(GoalError::Validation(format!(
                "unknown objective status '{}'",
                other
            ))),
        }
    }
}

/// The cadence an Objective is planned against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
    Custom,
}

impl Period {
    /// End date implied by a start date for the fixed cadences.
    ///
    /// Returns `None` for `Custom`, which always needs an explicit end.
    pub fn default_end(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Period::Weekly => Some(start + Duration::days(7)),
            Period::Monthly => start.checked_add_months(Months::new(1)),
            Period::Quarterly => start.checked_add_months(Months::new(3)),
            Period::Yearly => start.checked_add_months(Months::new(12)),
            Period::Custom => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
            Period::Quarterly => "quarterly",
            Period::Yearly => "yearly",
            Period::Custom => "custom",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = GoalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "weekly" => Ok(Period::Weekly),
            "monthly" => Ok(Period::Monthly),
            "quarterly" => Ok(Period::Quarterly),
            "yearly" => Ok(Period::Yearly),
            "custom" => Ok(Period::Custom),
            other => Err(GoalError::Validation(format!("unknown period '{}'", other))),
        }
    }
}

/// A time-boxed goal whose progress is the mean of its KeyResults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Objective {
    pub id: Uuid,

    /// Human-readable title (e.g., "Ship the billing rewrite").
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub start_date: DateTime<Utc>,

    pub end_date: DateTime<Utc>,

    pub period: Period,

    pub status: ObjectiveStatus,

    /// Rounded mean of KeyResult progress, 0-100.
    #[serde(default)]
    pub progress: f64,

    /// Optimistic concurrency counter, bumped on every successful save.
    #[serde(default)]
    pub revision: u64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Objective {
    /// Create an Active objective with zero progress.
    pub fn new(
        title: impl Into<String>,
        period: Period,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: None,
            start_date,
            end_date,
            period,
            status: ObjectiveStatus::Active,
            progress: 0.0,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Start the objective as a draft instead of active.
    pub fn draft(mut self) -> Self {
        self.status = ObjectiveStatus::Draft;
        self
    }

    /// Check the invariants a caller must hold before the first save.
    pub fn validate(&self) -> Result<(), GoalError> {
        if self.title.trim().is_empty() {
            return Err(GoalError::Validation(
                "objective title must not be empty".to_string(),
            ));
        }
        if self.end_date <= self.start_date {
            return Err(GoalError::Validation(format!(
                "objective end date {} must be after start date {}",
                self.end_date.to_rfc3339(),
                self.start_date.to_rfc3339()
            )));
        }
        Ok(())
    }

    /// Prepare the next revision of this record for a compare-and-swap save.
    pub fn next_revision(&mut self, now: DateTime<Utc>) {
        self.revision += 1;
        self.updated_at = now;
    }
}
