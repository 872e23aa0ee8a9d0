// repository.rs - GoalRepository: the persistence boundary of the engine.
//
// The propagator only ever talks to storage through this trait. Two
// implementations ship with the crate: `InMemoryGoalRepository` (memory.rs)
// and `JsonFileGoalRepository` (store.rs).

use std::sync::Arc;

use uuid::Uuid;

use crate::error::GoalResult;
use crate::key_result::{KeyResult, LinkedTask, TaskSnapshot};
use crate::objective::Objective;

/// Storage contract consumed by the propagation engine.
///
/// # Contract
/// - `find_*` by id returns `GoalError::NotFound` for unknown records.
/// - Linked tasks come back with `task_status` resolved from the latest
///   `save_task` for that task (`Todo` when the task was never reported).
/// - `save_objective` is a compare-and-swap: overwriting an existing
///   objective requires `objective.revision == stored.revision + 1`,
///   otherwise `GoalError::Conflict`. First inserts accept any revision.
/// - `transaction` runs its closure atomically: if the closure fails, every
///   write it made is rolled back. Transactions do not nest.
pub trait GoalRepository {
    fn find_objective(&self, id: Uuid) -> GoalResult<Objective>;

    fn find_key_result(&self, id: Uuid) -> GoalResult<KeyResult>;

    /// Key results of one objective, oldest first.
    fn find_key_results_by_objective(&self, objective_id: Uuid) -> GoalResult<Vec<KeyResult>>;

    fn find_linked_tasks_by_key_result(&self, key_result_id: Uuid) -> GoalResult<Vec<LinkedTask>>;

    fn find_linked_tasks_by_task(&self, task_id: Uuid) -> GoalResult<Vec<LinkedTask>>;

    fn save_key_result(&self, key_result: &KeyResult) -> GoalResult<()>;

    fn save_objective(&self, objective: &Objective) -> GoalResult<()>;

    /// All objectives, oldest first.
    fn list_objectives(&self) -> GoalResult<Vec<Objective>>;

    /// Remove a key result and every link pointing at it.
    fn delete_key_result(&self, id: Uuid) -> GoalResult<bool>;

    /// Insert a link, or replace the weight of an existing one.
    fn save_linked_task(&self, link: &LinkedTask) -> GoalResult<()>;

    fn delete_linked_task(&self, key_result_id: Uuid, task_id: Uuid) -> GoalResult<bool>;

    /// Record the latest status reported by the task subsystem.
    fn save_task(&self, task: &TaskSnapshot) -> GoalResult<()>;

    fn transaction<T, F>(&self, f: F) -> GoalResult<T>
    where
        F: FnOnce() -> GoalResult<T>;
}

macro_rules! delegate_goal_repository {
    ($($ty:ty),*) => {$(
        impl<R: GoalRepository> GoalRepository for $ty {
            fn find_objective(&self, id: Uuid) -> GoalResult<Objective> {
                (**self).find_objective(id)
            }

            fn find_key_result(&self, id: Uuid) -> GoalResult<KeyResult> {
                (**self).find_key_result(id)
            }

            fn find_key_results_by_objective(
                &self,
                objective_id: Uuid,
            ) -> GoalResult<Vec<KeyResult>> {
                (**self).find_key_results_by_objective(objective_id)
            }

            fn find_linked_tasks_by_key_result(
                &self,
                key_result_id: Uuid,
            ) -> GoalResult<Vec<LinkedTask>> {
                (**self).find_linked_tasks_by_key_result(key_result_id)
            }

            fn find_linked_tasks_by_task(&self, task_id: Uuid) -> GoalResult<Vec<LinkedTask>> {
                (**self).find_linked_tasks_by_task(task_id)
            }

            fn save_key_result(&self, key_result: &KeyResult) -> GoalResult<()> {
                (**self).save_key_result(key_result)
            }

            fn save_objective(&self, objective: &Objective) -> GoalResult<()> {
                (**self).save_objective(objective)
            }

            fn list_objectives(&self) -> GoalResult<Vec<Objective>> {
                (**self).list_objectives()
            }

            fn delete_key_result(&self, id: Uuid) -> GoalResult<bool> {
                (**self).delete_key_result(id)
            }

            fn save_linked_task(&self, link: &LinkedTask) -> GoalResult<()> {
                (**self).save_linked_task(link)
            }

            fn delete_linked_task(&self, key_result_id: Uuid, task_id: Uuid) -> GoalResult<bool> {
                (**self).delete_linked_task(key_result_id, task_id)
            }

            fn save_task(&self, task: &TaskSnapshot) -> GoalResult<()> {
                (**self).save_task(task)
            }

            fn transaction<T, F>(&self, f: F) -> GoalResult<T>
            where
                F: FnOnce() -> GoalResult<T>,
            {
                (**self).transaction(f)
            }
        }
    )*};
}

delegate_goal_repository!(&R, Arc<R>);
