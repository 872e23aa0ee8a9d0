// retry.rs - Retry wrapper for optimistic-concurrency conflicts.
//
// The propagator itself never retries. Callers that expect concurrent
// writers wrap a whole propagation in `with_conflict_retry`, which re-runs
// it from fresh reads when an objective save loses a compare-and-swap.

use crate::error::GoalResult;

/// Run `op` up to `max_attempts` times while it fails with a conflict.
///
/// Any other error, or a conflict on the final attempt, is returned as is.
/// `max_attempts` of 0 is treated as 1.
pub fn with_conflict_retry<T, F>(max_attempts: u32, mut op: F) -> GoalResult<T>
where
    F: FnMut() -> GoalResult<T>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Err(e) if e.is_conflict() && attempt < max_attempts => {
                tracing::warn!(attempt, max_attempts, "retrying after conflict: {}", e);
                attempt += 1;
            }
            other => return other,
        }
    }
}
