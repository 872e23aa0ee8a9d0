// propagator.rs - ProgressPropagator: keeps derived progress consistent.
//
// Every change to a leaf (task status, KR values, task links) flows through
// one of the entry points below:
//
//   task status ─┐
//   KR edit     ─┼─▶ recompute KeyResult(s) ─▶ recompute Objective ─▶ events
//   link change ─┘
//
// Within one chain, every affected KeyResult is recomputed and saved before
// its Objective is aggregated, so the aggregate never reads stale KR
// progress. Each public entry point runs inside one repository transaction
// and only dispatches events once that transaction has committed.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::GoalResult;
use crate::events::{EventDispatcher, EventSink, OkrEvent};
use crate::key_result::{KeyResult, MetricType};
use crate::metric::{calculate_progress, clamp_progress, MetricInput, TaskWeighting};
use crate::objective::{Objective, ObjectiveStatus};
use crate::repository::GoalRepository;
use crate::status::{infer_status, StatusPolicy};

/// What happened to a key result (or one of its links).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyResultMutation {
    Created,
    Updated,
    /// A task link was added, removed, or re-weighted.
    LinksChanged,
    /// The key result is gone; only its former objective is recomputed.
    Deleted { objective_id: Uuid },
}

/// Objective progress: rounded mean of its key results, 0 when it has none.
pub fn aggregate_progress(key_results: &[KeyResult]) -> f64 {
    if key_results.is_empty() {
        return 0.0;
    }
    let sum: f64 = key_results.iter().map(|kr| kr.progress).sum();
    clamp_progress(sum / key_results.len() as f64)
}

/// Orchestrates recomputation over a [`GoalRepository`].
pub struct ProgressPropagator<R, C = SystemClock> {
    repo: R,
    clock: C,
    weighting: TaskWeighting,
    policy: StatusPolicy,
    dispatcher: EventDispatcher,
}

impl<R: GoalRepository> ProgressPropagator<R, SystemClock> {
    /// A propagator reading the wall clock, with default settings.
    pub fn new(repo: R) -> Self {
        Self::with_clock(repo, SystemClock)
    }
}

impl<R: GoalRepository, C: Clock> ProgressPropagator<R, C> {
    pub fn with_clock(repo: R, clock: C) -> Self {
        Self {
            repo,
            clock,
            weighting: TaskWeighting::default(),
            policy: StatusPolicy::default(),
            dispatcher: EventDispatcher::new(),
        }
    }

    /// Apply metric and status settings from an engine config.
    pub fn with_engine_config(mut self, config: &EngineConfig) -> Self {
        self.weighting = config.metrics.task_weighting;
        self.policy = config.status;
        self
    }

    pub fn with_weighting(mut self, weighting: TaskWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn with_policy(mut self, policy: StatusPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: EventDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.dispatcher.add_sink(sink);
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Recompute one key result from its values and linked tasks.
    pub fn recalculate_key_result(&self, key_result_id: Uuid) -> GoalResult<KeyResult> {
        self.in_transaction(|events| self.refresh_key_result(key_result_id, events))
    }

    /// Recompute an objective's aggregate progress and status.
    pub fn recalculate_objective(&self, objective_id: Uuid) -> GoalResult<Objective> {
        self.in_transaction(|events| self.refresh_objective(objective_id, events))
    }

    /// Fan out a task status change to every TASK_COUNT key result linked
    /// to the task, then to their objectives.
    ///
    /// Returns the recomputed objectives. Calling it again without an
    /// intervening change writes nothing.
    pub fn on_task_status_changed(&self, task_id: Uuid) -> GoalResult<Vec<Objective>> {
        self.apply_task_change(task_id, |_| Ok(()))
    }

    /// Run `write` (typically `save_task`) and the fan-out for `task_id` in
    /// one transaction; a failed recompute also undoes the write.
    pub fn apply_task_change<F>(&self, task_id: Uuid, write: F) -> GoalResult<Vec<Objective>>
    where
        F: FnOnce(&R) -> GoalResult<()>,
    {
        self.in_transaction(|events| {
            write(&self.repo)?;
            let links = self.repo.find_linked_tasks_by_task(task_id)?;
            tracing::debug!(%task_id, links = links.len(), "task status changed");

            let mut objective_ids: Vec<Uuid> = Vec::new();
            for link in links {
                let kr = self.repo.find_key_result(link.key_result_id)?;
                if kr.metric_type != MetricType::TaskCount {
                    continue;
                }
                let kr = self.apply_metric(kr, events)?;
                if !objective_ids.contains(&kr.objective_id) {
                    objective_ids.push(kr.objective_id);
                }
            }

            objective_ids
                .into_iter()
                .map(|objective_id| self.refresh_objective(objective_id, events))
                .collect()
        })
    }

    /// Propagate a create/update/delete of a key result or of its links.
    pub fn on_key_result_mutated(
        &self,
        key_result_id: Uuid,
        mutation: KeyResultMutation,
    ) -> GoalResult<Objective> {
        self.apply_key_result_change(key_result_id, mutation, |_| Ok(()))
    }

    /// Run `write` (the key result or link edit itself) and its propagation
    /// in one transaction; a failed recompute also undoes the write.
    pub fn apply_key_result_change<F>(
        &self,
        key_result_id: Uuid,
        mutation: KeyResultMutation,
        write: F,
    ) -> GoalResult<Objective>
    where
        F: FnOnce(&R) -> GoalResult<()>,
    {
        self.in_transaction(|events| {
            write(&self.repo)?;
            let objective_id = match mutation {
                KeyResultMutation::Deleted { objective_id } => objective_id,
                KeyResultMutation::Created
                | KeyResultMutation::Updated
                | KeyResultMutation::LinksChanged => {
                    self.refresh_key_result(key_result_id, events)?.objective_id
                }
            };
            tracing::debug!(%key_result_id, ?mutation, "key result mutated");
            self.refresh_objective(objective_id, events)
        })
    }

    /// Run a caller edit of the objective record (e.g. activation) and
    /// recompute it in one transaction.
    pub fn apply_objective_change<F>(&self, objective_id: Uuid, write: F) -> GoalResult<Objective>
    where
        F: FnOnce(&R) -> GoalResult<()>,
    {
        self.in_transaction(|events| {
            write(&self.repo)?;
            self.refresh_objective(objective_id, events)
        })
    }

    /// Rebuild every key result and objective from scratch.
    pub fn recalculate_all(&self) -> GoalResult<Vec<Objective>> {
        self.in_transaction(|events| {
            let objectives = self.repo.list_objectives()?;
            let mut refreshed = Vec::with_capacity(objectives.len());
            for objective in objectives {
                for kr in self.repo.find_key_results_by_objective(objective.id)? {
                    self.apply_metric(kr, events)?;
                }
                refreshed.push(self.refresh_objective(objective.id, events)?);
            }
            Ok(refreshed)
        })
    }

    fn in_transaction<T, F>(&self, f: F) -> GoalResult<T>
    where
        F: FnOnce(&mut Vec<OkrEvent>) -> GoalResult<T>,
    {
        let mut events = Vec::new();
        let value = self.repo.transaction(|| f(&mut events))?;
        for event in &events {
            self.dispatcher.dispatch(event);
        }
        Ok(value)
    }

    fn refresh_key_result(
        &self,
        key_result_id: Uuid,
        events: &mut Vec<OkrEvent>,
    ) -> GoalResult<KeyResult> {
        let kr = self.repo.find_key_result(key_result_id)?;
        self.apply_metric(kr, events)
    }

    fn apply_metric(&self, mut kr: KeyResult, events: &mut Vec<OkrEvent>) -> GoalResult<KeyResult> {
        let links = self.repo.find_linked_tasks_by_key_result(kr.id)?;
        if let Err(e) = kr.check_consistency(&links) {
            tracing::error!(key_result_id = %kr.id, "refusing to recalculate: {}", e);
            return Err(e);
        }

        let progress = calculate_progress(&MetricInput::from_key_result(&kr, &links), self.weighting);
        if progress == kr.progress {
            return Ok(kr);
        }

        let now = self.clock.now();
        let previous = kr.progress;
        kr.progress = progress;
        kr.updated_at = now;
        self.repo.save_key_result(&kr)?;
        tracing::debug!(key_result_id = %kr.id, previous, progress, "key result recalculated");

        events.push(OkrEvent::KeyResultRecalculated {
            key_result_id: kr.id,
            objective_id: kr.objective_id,
            previous_progress: previous,
            progress,
            timestamp: now,
        });
        Ok(kr)
    }

    fn refresh_objective(
        &self,
        objective_id: Uuid,
        events: &mut Vec<OkrEvent>,
    ) -> GoalResult<Objective> {
        let mut objective = self.repo.find_objective(objective_id)?;
        let key_results = self.repo.find_key_results_by_objective(objective_id)?;
        let progress = aggregate_progress(&key_results);

        let now = self.clock.now();
        let status = infer_status(
            objective.status,
            progress,
            objective.start_date,
            objective.end_date,
            now,
            &self.policy,
        );

        if progress == objective.progress && status == objective.status {
            return Ok(objective);
        }

        let previous_progress = objective.progress;
        let previous_status = objective.status;
        objective.progress = progress;
        objective.status = status;
        objective.next_revision(now);
        self.repo.save_objective(&objective)?;

        if previous_progress != progress {
            events.push(OkrEvent::ObjectiveRecalculated {
                objective_id,
                previous_progress,
                progress,
                timestamp: now,
            });
        }
        if previous_status != status {
            tracing::info!(
                %objective_id,
                from = %previous_status,
                to = %status,
                progress,
                "objective status changed"
            );
            events.push(status_event(objective_id, previous_status, &objective, now));
        }
        Ok(objective)
    }
}

fn status_event(
    objective_id: Uuid,
    from: ObjectiveStatus,
    objective: &Objective,
    now: DateTime<Utc>,
) -> OkrEvent {
    OkrEvent::ObjectiveStatusChanged {
        objective_id,
        from_status: from,
        to_status: objective.status,
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::GoalError;
    use crate::key_result::{LinkedTask, TaskSnapshot, TaskStatus};
    use crate::memory::InMemoryGoalRepository;
    use crate::objective::{ObjectiveStatus, Period};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap()
    }

    struct Fixture {
        propagator: ProgressPropagator<InMemoryGoalRepository, FixedClock>,
        objective_id: Uuid,
    }

    impl Fixture {
        fn new() -> Self {
            let repo = InMemoryGoalRepository::new();
            let objective =
                Objective::new("Launch", Period::Monthly, t0(), t0() + Duration::days(30));
            repo.save_objective(&objective).unwrap();
            let clock = FixedClock::new(t0() + Duration::days(1));
            Self {
                propagator: ProgressPropagator::with_clock(repo, clock),
                objective_id: objective.id,
            }
        }

        fn repo(&self) -> &InMemoryGoalRepository {
            self.propagator.repository()
        }

        fn add_kr(&self, metric: MetricType, start: f64, target: f64, current: f64) -> Uuid {
            let mut kr = KeyResult::new(self.objective_id, "KR", metric, start, target);
            kr.current_value = current;
            self.repo().save_key_result(&kr).unwrap();
            kr.id
        }
    }

    #[test]
    fn aggregate_is_rounded_mean() {
        let objective_id = Uuid::new_v4();
        let krs: Vec<KeyResult> = [40.0, 60.0, 45.0]
            .iter()
            .map(|&p| {
                let mut kr = KeyResult::new(objective_id, "x", MetricType::Number, 0.0, 1.0);
                kr.progress = p;
                kr
            })
            .collect();
        assert_eq!(aggregate_progress(&krs[..2]), 50.0);
        // (40 + 60 + 45) / 3 = 48.33
        assert_eq!(aggregate_progress(&krs), 48.0);
        assert_eq!(aggregate_progress(&[]), 0.0);
    }

    #[test]
    fn recalculate_key_result_persists_progress() {
        let f = Fixture::new();
        let kr_id = f.add_kr(MetricType::Percentage, 0.0, 100.0, 40.0);

        let kr = f.propagator.recalculate_key_result(kr_id).unwrap();
        assert_eq!(kr.progress, 40.0);
        assert_eq!(f.repo().find_key_result(kr_id).unwrap().progress, 40.0);
    }

    #[test]
    fn recalculate_missing_records_is_not_found() {
        let f = Fixture::new();
        assert!(matches!(
            f.propagator.recalculate_key_result(Uuid::new_v4()),
            Err(GoalError::NotFound { .. })
        ));
        assert!(matches!(
            f.propagator.recalculate_objective(Uuid::new_v4()),
            Err(GoalError::NotFound { .. })
        ));
    }

    #[test]
    fn objective_without_key_results_reports_zero() {
        let f = Fixture::new();
        let obj = f.propagator.recalculate_objective(f.objective_id).unwrap();
        assert_eq!(obj.progress, 0.0);
        assert_eq!(obj.status, ObjectiveStatus::Active);
        // Nothing changed, nothing written.
        assert_eq!(obj.revision, 0);
    }

    #[test]
    fn key_result_update_flows_to_objective() {
        let f = Fixture::new();
        let a = f.add_kr(MetricType::Percentage, 0.0, 100.0, 40.0);
        let b = f.add_kr(MetricType::Number, 0.0, 10.0, 6.0);

        f.propagator
            .on_key_result_mutated(a, KeyResultMutation::Created)
            .unwrap();
        let obj = f
            .propagator
            .on_key_result_mutated(b, KeyResultMutation::Created)
            .unwrap();
        assert_eq!(obj.progress, 50.0);
    }

    #[test]
    fn deleted_key_result_only_recomputes_objective() {
        let f = Fixture::new();
        let a = f.add_kr(MetricType::Percentage, 0.0, 100.0, 40.0);
        let b = f.add_kr(MetricType::Percentage, 0.0, 100.0, 80.0);
        f.propagator.recalculate_all().unwrap();
        assert_eq!(f.repo().find_objective(f.objective_id).unwrap().progress, 60.0);

        f.repo().delete_key_result(b).unwrap();
        let obj = f
            .propagator
            .on_key_result_mutated(
                b,
                KeyResultMutation::Deleted {
                    objective_id: f.objective_id,
                },
            )
            .unwrap();
        assert_eq!(obj.progress, 40.0);
        assert!(f.repo().find_key_result(a).is_ok());
    }

    #[test]
    fn task_change_only_touches_task_count_key_results() {
        let f = Fixture::new();
        let tasks_kr = f.add_kr(MetricType::TaskCount, 0.0, 0.0, 0.0);
        let numeric_kr = f.add_kr(MetricType::Number, 0.0, 10.0, 0.0);
        let task_id = Uuid::new_v4();
        f.repo()
            .save_linked_task(&LinkedTask::new(tasks_kr, task_id))
            .unwrap();
        f.repo()
            .save_linked_task(&LinkedTask::new(numeric_kr, task_id))
            .unwrap();
        f.repo()
            .save_task(&TaskSnapshot {
                id: task_id,
                status: TaskStatus::Completed,
            })
            .unwrap();

        let objectives = f.propagator.on_task_status_changed(task_id).unwrap();
        assert_eq!(objectives.len(), 1);
        assert_eq!(objectives[0].progress, 50.0);
        assert_eq!(f.repo().find_key_result(tasks_kr).unwrap().progress, 100.0);
        assert_eq!(f.repo().find_key_result(numeric_kr).unwrap().progress, 0.0);
    }

    #[test]
    fn unknown_task_is_a_no_op() {
        let f = Fixture::new();
        assert!(f
            .propagator
            .on_task_status_changed(Uuid::new_v4())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn inconsistent_key_result_is_invalid_state() {
        let f = Fixture::new();
        let kr_id = f.add_kr(MetricType::Number, 0.0, f64::INFINITY, 1.0);
        assert!(matches!(
            f.propagator.recalculate_key_result(kr_id),
            Err(GoalError::InvalidState { .. })
        ));
    }

    #[test]
    fn weighting_setting_is_honored() {
        let f = Fixture::new();
        let kr_id = f.add_kr(MetricType::TaskCount, 0.0, 0.0, 0.0);
        let done = Uuid::new_v4();
        f.repo()
            .save_linked_task(&LinkedTask::new(kr_id, done).with_weight(3.0))
            .unwrap();
        f.repo()
            .save_linked_task(&LinkedTask::new(kr_id, Uuid::new_v4()))
            .unwrap();
        f.repo()
            .save_task(&TaskSnapshot {
                id: done,
                status: TaskStatus::Completed,
            })
            .unwrap();

        assert_eq!(f.propagator.recalculate_key_result(kr_id).unwrap().progress, 75.0);

        let unweighted = ProgressPropagator::with_clock(f.repo(), FixedClock::new(t0()))
            .with_weighting(TaskWeighting::Unweighted);
        assert_eq!(unweighted.recalculate_key_result(kr_id).unwrap().progress, 50.0);
    }
}
