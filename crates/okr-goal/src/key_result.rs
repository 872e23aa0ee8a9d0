// key_result.rs - KeyResult, its task links, and the external task projection.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GoalError;

/// How a KeyResult measures progress.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Percentage,
    Number,
    Currency,
    /// Done or not done: any positive current value counts as done.
    Boolean,
    /// Completion ratio of the linked tasks.
    TaskCount,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Percentage => "percentage",
            MetricType::Number => "number",
            MetricType::Currency => "currency",
            MetricType::Boolean => "boolean",
            MetricType::TaskCount => "task_count",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = GoalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "percentage" => Ok(MetricType::Percentage),
            "number" => Ok(MetricType::Number),
            "currency" => Ok(MetricType::Currency),
            "boolean" => Ok(MetricType::Boolean),
            "task_count" => Ok(MetricType::TaskCount),
            other => Err(GoalError::Validation(format!(
                "unknown metric type '{}'",
                other
            ))),
        }
    }
}

/// Status of an external task, as reported by the task subsystem.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = GoalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "todo" => Ok(TaskStatus::Todo),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(GoalError::Validation(format!(
                "unknown task status '{}'",
                other
            ))),
        }
    }
}

/// Read-only projection of an external task: only identity and status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub id: Uuid,
    pub status: TaskStatus,
}

/// A measurable sub-goal of an Objective.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyResult {
    pub id: Uuid,

    pub objective_id: Uuid,

    pub title: String,

    pub metric_type: MetricType,

    /// Absent values deserialize as 0.
    #[serde(default)]
    pub start_value: f64,

    pub target_value: f64,

    #[serde(default)]
    pub current_value: f64,

    /// Derived by the metric calculator; 0-100.
    #[serde(default)]
    pub progress: f64,

    /// Display unit for numeric metrics ("USD", "signups").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl KeyResult {
    pub fn new(
        objective_id: Uuid,
        title: impl Into<String>,
        metric_type: MetricType,
        start_value: f64,
        target_value: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            objective_id,
            title: title.into(),
            metric_type,
            start_value,
            target_value,
            current_value: start_value,
            progress: 0.0,
            unit: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check that the metric fields can be fed to the calculator.
    ///
    /// Upstream validation should make this unreachable; a failure here
    /// means stored data is corrupt.
    pub fn check_consistency(&self, links: &[LinkedTask]) -> Result<(), GoalError> {
        let values = [
            ("start_value", self.start_value),
            ("target_value", self.target_value),
            ("current_value", self.current_value),
        ];
        for (name, value) in values {
            if !value.is_finite() {
                return Err(GoalError::InvalidState {
                    id: self.id,
                    reason: format!("{} is not a finite number", name),
                });
            }
        }

        for link in links {
            if link.key_result_id != self.id {
                return Err(GoalError::InvalidState {
                    id: self.id,
                    reason: format!(
                        "link for task {} belongs to key result {}",
                        link.task_id, link.key_result_id
                    ),
                });
            }
            if !link.weight.is_finite() || link.weight < 0.0 {
                return Err(GoalError::InvalidState {
                    id: self.id,
                    reason: format!("link for task {} has weight {}", link.task_id, link.weight),
                });
            }
        }

        Ok(())
    }
}

fn default_weight() -> f64 {
    1.0
}

/// Weighted association between a KeyResult and an external task.
///
/// The `(key_result_id, task_id)` pair is unique. `task_status` is a
/// snapshot filled in by the repository when the link is read.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LinkedTask {
    pub key_result_id: Uuid,

    pub task_id: Uuid,

    #[serde(default = "default_weight")]
    pub weight: f64,

    #[serde(default)]
    pub task_status: TaskStatus,
}

impl LinkedTask {
    /// A link with the default weight of 1.
    pub fn new(key_result_id: Uuid, task_id: Uuid) -> Self {
        Self {
            key_result_id,
            task_id,
            weight: default_weight(),
            task_status: TaskStatus::Todo,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn is_completed(&self) -> bool {
        self.task_status == TaskStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kr() -> KeyResult {
        KeyResult::new(Uuid::new_v4(), "Signups", MetricType::Number, 0.0, 100.0)
    }

    #[test]
    fn new_key_result_starts_at_start_value() {
        let kr = KeyResult::new(Uuid::new_v4(), "Churn", MetricType::Percentage, 12.0, 5.0);
        assert_eq!(kr.current_value, 12.0);
        assert_eq!(kr.progress, 0.0);
    }

    #[test]
    fn missing_values_deserialize_as_zero() {
        let json = format!(
            r#"{{
                "id": "{}",
                "objective_id": "{}",
                "title": "Launch",
                "metric_type": "boolean",
                "target_value": 1.0,
                "created_at": "2026-01-01T00:00:00Z",
                "updated_at": "2026-01-01T00:00:00Z"
            }}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        let kr: KeyResult = serde_json::from_str(&json).unwrap();
        assert_eq!(kr.start_value, 0.0);
        assert_eq!(kr.current_value, 0.0);
        assert!(kr.unit.is_none());
    }

    #[test]
    fn link_weight_defaults_to_one() {
        let json = format!(
            r#"{{"key_result_id": "{}", "task_id": "{}"}}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        let link: LinkedTask = serde_json::from_str(&json).unwrap();
        assert_eq!(link.weight, 1.0);
        assert_eq!(link.task_status, TaskStatus::Todo);
    }

    #[test]
    fn consistency_rejects_non_finite_values() {
        let mut kr = kr();
        kr.current_value = f64::NAN;
        assert!(matches!(
            kr.check_consistency(&[]),
            Err(GoalError::InvalidState { .. })
        ));
    }

    #[test]
    fn consistency_rejects_foreign_and_negative_links() {
        let kr = kr();
        let foreign = LinkedTask::new(Uuid::new_v4(), Uuid::new_v4());
        assert!(kr.check_consistency(&[foreign]).is_err());

        let negative = LinkedTask::new(kr.id, Uuid::new_v4()).with_weight(-1.0);
        assert!(kr.check_consistency(&[negative]).is_err());

        let ok = LinkedTask::new(kr.id, Uuid::new_v4()).with_weight(2.5);
        assert!(kr.check_consistency(&[ok]).is_ok());
    }

    #[test]
    fn metric_type_parses_kebab_case() {
        assert_eq!(
            "task-count".parse::<MetricType>().unwrap(),
            MetricType::TaskCount
        );
        assert!("ratio".parse::<MetricType>().is_err());
        assert_eq!(
            "in-progress".parse::<TaskStatus>().unwrap(),
            TaskStatus::InProgress
        );
    }
}
