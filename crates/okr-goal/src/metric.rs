// metric.rs - MetricCalculator: KeyResult progress from its raw values.
//
// Pure and total: every input maps to a progress in [0, 100], rounded to a
// whole number. Nothing here touches storage or the clock.

use serde::{Deserialize, Serialize};

use crate::key_result::{KeyResult, LinkedTask, MetricType, TaskStatus};

/// Upper bound of any progress value.
pub const MAX_PROGRESS: f64 = 100.0;

/// How TASK_COUNT key results count their linked tasks.
///
/// `Weighted` sums each link's `weight`; `Unweighted` counts links, which
/// ignores the weight entirely. One value is chosen engine-wide.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskWeighting {
    #[default]
    Weighted,
    Unweighted,
}

/// One linked task as the calculator sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskProgress {
    pub status: TaskStatus,
    pub weight: f64,
}

impl From<&LinkedTask> for TaskProgress {
    fn from(link: &LinkedTask) -> Self {
        Self {
            status: link.task_status,
            weight: link.weight,
        }
    }
}

/// Value snapshot of a KeyResult, decoupled from storage records.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricInput {
    pub metric_type: MetricType,
    pub start_value: f64,
    pub target_value: f64,
    pub current_value: f64,
    pub linked_tasks: Vec<TaskProgress>,
}

impl MetricInput {
    pub fn from_key_result(kr: &KeyResult, links: &[LinkedTask]) -> Self {
        Self {
            metric_type: kr.metric_type,
            start_value: kr.start_value,
            target_value: kr.target_value,
            current_value: kr.current_value,
            linked_tasks: links.iter().map(TaskProgress::from).collect(),
        }
    }
}

/// Compute a KeyResult's progress percentage.
pub fn calculate_progress(input: &MetricInput, weighting: TaskWeighting) -> f64 {
    match input.metric_type {
        MetricType::Boolean => {
            if input.current_value > 0.0 {
                MAX_PROGRESS
            } else {
                0.0
            }
        }
        MetricType::TaskCount => task_completion(&input.linked_tasks, weighting),
        MetricType::Percentage | MetricType::Number | MetricType::Currency => {
            linear_progress(input.start_value, input.target_value, input.current_value)
        }
    }
}

/// Round to the nearest whole percent and clamp into [0, 100].
///
/// NaN collapses to 0; infinities clamp like any other out-of-range value.
pub fn clamp_progress(raw: f64) -> f64 {
    let rounded = raw.round();
    if rounded.is_nan() {
        return 0.0;
    }
    rounded.clamp(0.0, MAX_PROGRESS)
}

/// Position of `current` on the line from `start` to `target`.
///
/// A target below the start ("reduce churn to 5%") works unchanged: the
/// signs of numerator and range cancel.
fn linear_progress(start: f64, target: f64, current: f64) -> f64 {
    let range = target - start;
    if range == 0.0 {
        return if current >= target { MAX_PROGRESS } else { 0.0 };
    }
    clamp_progress(MAX_PROGRESS * (current - start) / range)
}

fn task_completion(tasks: &[TaskProgress], weighting: TaskWeighting) -> f64 {
    if tasks.is_empty() {
        return 0.0;
    }

    let weight_of = |task: &TaskProgress| match weighting {
        TaskWeighting::Weighted => task.weight,
        TaskWeighting::Unweighted => 1.0,
    };

    let total: f64 = tasks.iter().map(weight_of).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let completed: f64 = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .map(weight_of)
        .sum();

    clamp_progress(MAX_PROGRESS * completed / total)
}
