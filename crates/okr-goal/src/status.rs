// status.rs - StatusInferencer: Objective status from progress and elapsed time.
//
// An objective is judged against where it "should" be: linear
// interpolation of 0..100 across its time box. Entering AT_RISK uses a
// tighter margin than leaving it, so a value hovering near the boundary
// does not flap between ACTIVE and AT_RISK.
//
// `now` is always supplied by the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metric::MAX_PROGRESS;
use crate::objective::ObjectiveStatus;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Thresholds for the at-risk state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatusPolicy {
    /// AT_RISK is only considered when fewer days than this remain.
    pub at_risk_window_days: f64,
    /// Points behind expectation that trigger AT_RISK.
    pub at_risk_margin: f64,
    /// Points behind expectation at or above which AT_RISK recovers.
    pub recovery_margin: f64,
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self {
            at_risk_window_days: 7.0,
            at_risk_margin: 20.0,
            recovery_margin: 10.0,
        }
    }
}

/// The outcome of one inference, with the numbers that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusAssessment {
    pub status: ObjectiveStatus,
    /// Progress the objective should have by now, 0-100.
    pub expected_progress: f64,
    /// Fractional days until `end`; negative once the period is over.
    pub days_remaining: f64,
}

/// Progress expected at `now`, clamped to [0, 100].
///
/// A zero-length period expects 100. An inverted period (end before start)
/// still yields a clamped value.
pub fn expected_progress(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let total = (end - start).num_milliseconds();
    if total == 0 {
        return MAX_PROGRESS;
    }
    let elapsed = (now - start).num_milliseconds();
    let raw = MAX_PROGRESS * elapsed as f64 / total as f64;
    raw.clamp(0.0, MAX_PROGRESS)
}

/// Fractional days from `now` until `end`.
pub fn days_remaining(end: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (end - now).num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY
}

/// Compute the next status and the values it was derived from.
pub fn assess(
    current: ObjectiveStatus,
    progress: f64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
    policy: &StatusPolicy,
) -> StatusAssessment {
    let expected = expected_progress(start, end, now);
    let remaining = days_remaining(end, now);

    let status = if current.is_terminal() {
        current
    } else if progress >= MAX_PROGRESS {
        ObjectiveStatus::Completed
    } else if remaining < policy.at_risk_window_days && progress < expected - policy.at_risk_margin
    {
        ObjectiveStatus::AtRisk
    } else if current == ObjectiveStatus::AtRisk && progress >= expected - policy.recovery_margin {
        ObjectiveStatus::Active
    } else {
        current
    };

    StatusAssessment {
        status,
        expected_progress: expected,
        days_remaining: remaining,
    }
}

/// Compute the next status of an objective.
pub fn infer_status(
    current: ObjectiveStatus,
    progress: f64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
    policy: &StatusPolicy,
) -> ObjectiveStatus {
    assess(current, progress, start, end, now, policy).status
}
