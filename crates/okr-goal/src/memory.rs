// memory.rs - InMemoryGoalRepository: a mutex-guarded repository.
//
// Used by tests and by embedders that keep their own persistence. A
// transaction snapshots the whole state and restores it if the closure
// fails. Every operation enters the gate, so while a transaction is open
// no other thread can write anything the restore would erase.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use crate::error::{GoalError, GoalResult};
use crate::gate::Gate;
use crate::key_result::{KeyResult, LinkedTask, TaskSnapshot, TaskStatus};
use crate::objective::Objective;
use crate::repository::GoalRepository;

#[derive(Debug, Clone, Default)]
struct State {
    objectives: HashMap<Uuid, Objective>,
    key_results: HashMap<Uuid, KeyResult>,
    /// Keyed by (key_result_id, task_id), which makes the pair unique.
    links: BTreeMap<(Uuid, Uuid), LinkedTask>,
    tasks: HashMap<Uuid, TaskStatus>,
}

impl State {
    fn resolve(&self, link: &LinkedTask) -> LinkedTask {
        let mut link = *link;
        link.task_status = self.tasks.get(&link.task_id).copied().unwrap_or_default();
        link
    }
}

/// Repository that keeps every record in memory.
#[derive(Debug, Default)]
pub struct InMemoryGoalRepository {
    state: Mutex<State>,
    gate: Gate,
}

impl InMemoryGoalRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic mid-write cannot leave a half-applied record: every
        // mutation below is a single map operation.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl GoalRepository for InMemoryGoalRepository {
    fn find_objective(&self, id: Uuid) -> GoalResult<Objective> {
        let _gate = self.gate.enter();
        self.state()
            .objectives
            .get(&id)
            .cloned()
            .ok_or_else(|| GoalError::objective_not_found(id))
    }

    fn find_key_result(&self, id: Uuid) -> GoalResult<KeyResult> {
        let _gate = self.gate.enter();
        self.state()
            .key_results
            .get(&id)
            .cloned()
            .ok_or_else(|| GoalError::key_result_not_found(id))
    }

    fn find_key_results_by_objective(&self, objective_id: Uuid) -> GoalResult<Vec<KeyResult>> {
        let _gate = self.gate.enter();
        let mut krs: Vec<KeyResult> = self
            .state()
            .key_results
            .values()
            .filter(|kr| kr.objective_id == objective_id)
            .cloned()
            .collect();
        krs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(krs)
    }

    fn find_linked_tasks_by_key_result(&self, key_result_id: Uuid) -> GoalResult<Vec<LinkedTask>> {
        let _gate = self.gate.enter();
        let state = self.state();
        Ok(state
            .links
            .range((key_result_id, Uuid::nil())..=(key_result_id, Uuid::from_u128(u128::MAX)))
            .map(|(_, link)| state.resolve(link))
            .collect())
    }

    fn find_linked_tasks_by_task(&self, task_id: Uuid) -> GoalResult<Vec<LinkedTask>> {
        let _gate = self.gate.enter();
        let state = self.state();
        Ok(state
            .links
            .values()
            .filter(|link| link.task_id == task_id)
            .map(|link| state.resolve(link))
            .collect())
    }

    fn save_key_result(&self, key_result: &KeyResult) -> GoalResult<()> {
        let _gate = self.gate.enter();
        self.state()
            .key_results
            .insert(key_result.id, key_result.clone());
        Ok(())
    }

    fn save_objective(&self, objective: &Objective) -> GoalResult<()> {
        let _gate = self.gate.enter();
        let mut state = self.state();
        if let Some(stored) = state.objectives.get(&objective.id) {
            if objective.revision != stored.revision + 1 {
                return Err(GoalError::Conflict {
                    objective_id: objective.id,
                    expected: stored.revision + 1,
                    found: objective.revision,
                });
            }
        }
        state.objectives.insert(objective.id, objective.clone());
        Ok(())
    }

    fn list_objectives(&self) -> GoalResult<Vec<Objective>> {
        let _gate = self.gate.enter();
        let mut objectives: Vec<Objective> = self.state().objectives.values().cloned().collect();
        objectives.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(objectives)
    }

    fn delete_key_result(&self, id: Uuid) -> GoalResult<bool> {
        let _gate = self.gate.enter();
        let mut state = self.state();
        let removed = state.key_results.remove(&id).is_some();
        state.links.retain(|(kr_id, _), _| *kr_id != id);
        Ok(removed)
    }

    fn save_linked_task(&self, link: &LinkedTask) -> GoalResult<()> {
        let _gate = self.gate.enter();
        let mut state = self.state();
        if !state.key_results.contains_key(&link.key_result_id) {
            return Err(GoalError::key_result_not_found(link.key_result_id));
        }
        state.links.insert((link.key_result_id, link.task_id), *link);
        Ok(())
    }

    fn delete_linked_task(&self, key_result_id: Uuid, task_id: Uuid) -> GoalResult<bool> {
        let _gate = self.gate.enter();
        Ok(self
            .state()
            .links
            .remove(&(key_result_id, task_id))
            .is_some())
    }

    fn save_task(&self, task: &TaskSnapshot) -> GoalResult<()> {
        let _gate = self.gate.enter();
        self.state().tasks.insert(task.id, task.status);
        Ok(())
    }

    fn transaction<T, F>(&self, f: F) -> GoalResult<T>
    where
        F: FnOnce() -> GoalResult<T>,
    {
        let _gate = self.gate.enter();
        let snapshot = self.state().clone();

        let result = f();
        if result.is_err() {
            *self.state() = snapshot;
            tracing::debug!("in-memory transaction rolled back");
        }
        result
    }
}
