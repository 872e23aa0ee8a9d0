// store.rs - JsonFileGoalRepository: file-per-record persistence.
//
// Layout under the store directory:
//   objectives/<id>.json
//   key_results/<id>.json
//   links/<key_result_id>__<task_id>.json
//   tasks/<task_id>.json
//
// Within a transaction every overwritten or removed file is recorded in an
// undo log first, so a failed propagation can be put back exactly as it was.
// Every operation enters the gate, so the log only ever holds writes made by
// the thread that owns the open transaction.
//
// A record that fails to parse is an error, never skipped: a key result
// silently missing from the aggregate would push its objective to a wrong,
// possibly terminal, status.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{GoalError, GoalResult};
use crate::gate::Gate;
use crate::key_result::{KeyResult, LinkedTask, TaskSnapshot};
use crate::objective::Objective;
use crate::repository::GoalRepository;

const OBJECTIVES_DIR: &str = "objectives";
const KEY_RESULTS_DIR: &str = "key_results";
const LINKS_DIR: &str = "links";
const TASKS_DIR: &str = "tasks";

/// Previous content of a file touched inside a transaction.
/// `None` means the file did not exist.
type UndoEntry = (PathBuf, Option<Vec<u8>>);

/// Persistent repository backed by a directory of JSON files.
pub struct JsonFileGoalRepository {
    store_dir: PathBuf,
    gate: Gate,
    undo: Mutex<Option<Vec<UndoEntry>>>,
}

impl JsonFileGoalRepository {
    /// Open a store rooted at `store_dir`, creating the layout if needed.
    pub fn new(store_dir: impl AsRef<Path>) -> GoalResult<Self> {
        let store_dir = store_dir.as_ref().to_path_buf();
        for sub in [OBJECTIVES_DIR, KEY_RESULTS_DIR, LINKS_DIR, TASKS_DIR] {
            let dir = store_dir.join(sub);
            fs::create_dir_all(&dir).map_err(|source| io_error(&dir, source))?;
        }
        Ok(Self {
            store_dir,
            gate: Gate::default(),
            undo: Mutex::new(None),
        })
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    fn objective_file(&self, id: Uuid) -> PathBuf {
        self.store_dir.join(OBJECTIVES_DIR).join(format!("{}.json", id))
    }

    fn key_result_file(&self, id: Uuid) -> PathBuf {
        self.store_dir.join(KEY_RESULTS_DIR).join(format!("{}.json", id))
    }

    fn link_file(&self, key_result_id: Uuid, task_id: Uuid) -> PathBuf {
        self.store_dir
            .join(LINKS_DIR)
            .join(format!("{}__{}.json", key_result_id, task_id))
    }

    fn task_file(&self, id: Uuid) -> PathBuf {
        self.store_dir.join(TASKS_DIR).join(format!("{}.json", id))
    }

    fn undo_log(&self) -> MutexGuard<'_, Option<Vec<UndoEntry>>> {
        self.undo.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remember the current content of `path` if a transaction is open and
    /// the file has not been touched yet in it.
    fn record_undo(&self, path: &Path) -> GoalResult<()> {
        let mut guard = self.undo_log();
        let Some(entries) = guard.as_mut() else {
            return Ok(());
        };
        if entries.iter().any(|(p, _)| p == path) {
            return Ok(());
        }
        let previous = match fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(source) => return Err(io_error(path, source)),
        };
        entries.push((path.to_path_buf(), previous));
        Ok(())
    }

    fn rollback(&self, entries: Vec<UndoEntry>) {
        for (path, previous) in entries.into_iter().rev() {
            let restored = match previous {
                Some(bytes) => fs::write(&path, bytes),
                None => match fs::remove_file(&path) {
                    Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                    other => other,
                },
            };
            if let Err(e) = restored {
                tracing::error!("failed to roll back {}: {}", path.display(), e);
            }
        }
    }

    fn write_record<T: Serialize>(&self, path: &Path, record: &T) -> GoalResult<()> {
        self.record_undo(path)?;
        let json = serde_json::to_string_pretty(record)?;
        fs::write(path, json).map_err(|source| io_error(path, source))?;
        Ok(())
    }

    fn remove_record(&self, path: &Path) -> GoalResult<bool> {
        if !path.exists() {
            return Ok(false);
        }
        self.record_undo(path)?;
        fs::remove_file(path).map_err(|source| io_error(path, source))?;
        Ok(true)
    }

    fn read_record<T: DeserializeOwned>(&self, path: &Path) -> GoalResult<Option<T>> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(io_error(path, source)),
        };
        parse_record(path, &json).map(Some)
    }

    /// Every record in one subdirectory. Non-json files are ignored; a json
    /// file that does not parse fails the whole listing.
    fn read_all<T: DeserializeOwned>(&self, sub: &str) -> GoalResult<Vec<T>> {
        let dir = self.store_dir.join(sub);
        let entries = fs::read_dir(&dir).map_err(|source| io_error(&dir, source))?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| io_error(&dir, source))?;
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let json = fs::read_to_string(&path).map_err(|source| io_error(&path, source))?;
            records.push(parse_record(&path, &json)?);
        }
        Ok(records)
    }

    fn resolve(&self, mut link: LinkedTask) -> GoalResult<LinkedTask> {
        link.task_status = self
            .read_record::<TaskSnapshot>(&self.task_file(link.task_id))?
            .map(|task| task.status)
            .unwrap_or_default();
        Ok(link)
    }
}

impl GoalRepository for JsonFileGoalRepository {
    fn find_objective(&self, id: Uuid) -> GoalResult<Objective> {
        let _gate = self.gate.enter();
        self.read_record(&self.objective_file(id))?
            .ok_or_else(|| GoalError::objective_not_found(id))
    }

    fn find_key_result(&self, id: Uuid) -> GoalResult<KeyResult> {
        let _gate = self.gate.enter();
        self.read_record(&self.key_result_file(id))?
            .ok_or_else(|| GoalError::key_result_not_found(id))
    }

    fn find_key_results_by_objective(&self, objective_id: Uuid) -> GoalResult<Vec<KeyResult>> {
        let _gate = self.gate.enter();
        let mut krs: Vec<KeyResult> = self
            .read_all::<KeyResult>(KEY_RESULTS_DIR)?
            .into_iter()
            .filter(|kr| kr.objective_id == objective_id)
            .collect();
        krs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(krs)
    }

    fn find_linked_tasks_by_key_result(&self, key_result_id: Uuid) -> GoalResult<Vec<LinkedTask>> {
        let _gate = self.gate.enter();
        let mut links: Vec<LinkedTask> = self
            .read_all::<LinkedTask>(LINKS_DIR)?
            .into_iter()
            .filter(|link| link.key_result_id == key_result_id)
            .collect();
        links.sort_by_key(|link| link.task_id);
        links.into_iter().map(|link| self.resolve(link)).collect()
    }

    fn find_linked_tasks_by_task(&self, task_id: Uuid) -> GoalResult<Vec<LinkedTask>> {
        let _gate = self.gate.enter();
        let mut links: Vec<LinkedTask> = self
            .read_all::<LinkedTask>(LINKS_DIR)?
            .into_iter()
            .filter(|link| link.task_id == task_id)
            .collect();
        links.sort_by_key(|link| link.key_result_id);
        links.into_iter().map(|link| self.resolve(link)).collect()
    }

    fn save_key_result(&self, key_result: &KeyResult) -> GoalResult<()> {
        let _gate = self.gate.enter();
        tracing::debug!(key_result_id = %key_result.id, "saving key result");
        self.write_record(&self.key_result_file(key_result.id), key_result)
    }

    fn save_objective(&self, objective: &Objective) -> GoalResult<()> {
        let _gate = self.gate.enter();
        let path = self.objective_file(objective.id);
        if let Some(stored) = self.read_record::<Objective>(&path)? {
            if objective.revision != stored.revision + 1 {
                return Err(GoalError::Conflict {
                    objective_id: objective.id,
                    expected: stored.revision + 1,
                    found: objective.revision,
                });
            }
        }
        tracing::debug!(objective_id = %objective.id, revision = objective.revision, "saving objective");
        self.write_record(&path, objective)
    }

    fn list_objectives(&self) -> GoalResult<Vec<Objective>> {
        let _gate = self.gate.enter();
        let mut objectives = self.read_all::<Objective>(OBJECTIVES_DIR)?;
        objectives.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(objectives)
    }

    fn delete_key_result(&self, id: Uuid) -> GoalResult<bool> {
        let _gate = self.gate.enter();
        let links: Vec<LinkedTask> = self
            .read_all::<LinkedTask>(LINKS_DIR)?
            .into_iter()
            .filter(|link| link.key_result_id == id)
            .collect();
        for link in links {
            self.remove_record(&self.link_file(link.key_result_id, link.task_id))?;
        }
        self.remove_record(&self.key_result_file(id))
    }

    fn save_linked_task(&self, link: &LinkedTask) -> GoalResult<()> {
        let _gate = self.gate.enter();
        if !self.key_result_file(link.key_result_id).exists() {
            return Err(GoalError::key_result_not_found(link.key_result_id));
        }
        self.write_record(&self.link_file(link.key_result_id, link.task_id), link)
    }

    fn delete_linked_task(&self, key_result_id: Uuid, task_id: Uuid) -> GoalResult<bool> {
        let _gate = self.gate.enter();
        self.remove_record(&self.link_file(key_result_id, task_id))
    }

    fn save_task(&self, task: &TaskSnapshot) -> GoalResult<()> {
        let _gate = self.gate.enter();
        self.write_record(&self.task_file(task.id), task)
    }

    fn transaction<T, F>(&self, f: F) -> GoalResult<T>
    where
        F: FnOnce() -> GoalResult<T>,
    {
        let _gate = self.gate.enter();
        if self.undo_log().is_some() {
            // Already inside a transaction on this thread; it owns rollback.
            return f();
        }
        *self.undo_log() = Some(Vec::new());

        let result = f();

        let entries = self.undo_log().take().unwrap_or_default();
        if result.is_err() {
            tracing::warn!(
                files = entries.len(),
                "transaction failed, restoring touched records"
            );
            self.rollback(entries);
        }
        result
    }
}

fn io_error(path: &Path, source: std::io::Error) -> GoalError {
    GoalError::IoError {
        path: path.display().to_string(),
        source,
    }
}

fn parse_record<T: DeserializeOwned>(path: &Path, json: &str) -> GoalResult<T> {
    serde_json::from_str(json).map_err(|source| {
        tracing::error!("corrupt record {}: {}", path.display(), source);
        GoalError::CorruptRecord {
            path: path.display().to_string(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_result::{MetricType, TaskStatus};
    use crate::objective::Period;
    use chrono::{Duration, Utc};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration as StdDuration;
    use tempfile::tempdir;

    fn make_objective(title: &str) -> Objective {
        let start = Utc::now();
        Objective::new(title, Period::Monthly, start, start + Duration::days(30))
    }

    #[test]
    fn save_and_find_round_trip() {
        let dir = tempdir().unwrap();
        let store = JsonFileGoalRepository::new(dir.path().join("store")).unwrap();

        let obj = make_objective("Test Objective");
        store.save_objective(&obj).unwrap();

        let found = store.find_objective(obj.id).unwrap();
        assert_eq!(found.id, obj.id);
        assert_eq!(found.title, "Test Objective");
    }

    #[test]
    fn find_nonexistent_returns_not_found() {
        let dir = tempdir().unwrap();
        let store = JsonFileGoalRepository::new(dir.path()).unwrap();

        let result = store.find_objective(Uuid::new_v4());
        assert!(matches!(result, Err(GoalError::NotFound { .. })));
    }

    #[test]
    fn list_returns_objectives_oldest_first() {
        let dir = tempdir().unwrap();
        let store = JsonFileGoalRepository::new(dir.path()).unwrap();

        let first = make_objective("First");
        let mut second = make_objective("Second");
        second.created_at = first.created_at + Duration::seconds(1);
        store.save_objective(&second).unwrap();
        store.save_objective(&first).unwrap();

        let listed = store.list_objectives().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].title, "First");
    }

    #[test]
    fn stale_objective_write_conflicts() {
        let dir = tempdir().unwrap();
        let store = JsonFileGoalRepository::new(dir.path()).unwrap();

        let mut obj = make_objective("Goal");
        store.save_objective(&obj).unwrap();
        assert!(store.save_objective(&obj).unwrap_err().is_conflict());

        obj.next_revision(Utc::now());
        store.save_objective(&obj).unwrap();
    }

    #[test]
    fn links_and_task_status_round_trip() {
        let dir = tempdir().unwrap();
        let store = JsonFileGoalRepository::new(dir.path()).unwrap();

        let obj = make_objective("Goal");
        let kr = KeyResult::new(obj.id, "Tasks", MetricType::TaskCount, 0.0, 0.0);
        store.save_key_result(&kr).unwrap();

        let task_id = Uuid::new_v4();
        store
            .save_linked_task(&LinkedTask::new(kr.id, task_id).with_weight(2.0))
            .unwrap();
        store
            .save_task(&TaskSnapshot {
                id: task_id,
                status: TaskStatus::Completed,
            })
            .unwrap();

        let links = store.find_linked_tasks_by_key_result(kr.id).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].weight, 2.0);
        assert_eq!(links[0].task_status, TaskStatus::Completed);
        assert_eq!(store.find_linked_tasks_by_task(task_id).unwrap().len(), 1);
    }

    #[test]
    fn delete_key_result_removes_links() {
        let dir = tempdir().unwrap();
        let store = JsonFileGoalRepository::new(dir.path()).unwrap();

        let kr = KeyResult::new(Uuid::new_v4(), "Tasks", MetricType::TaskCount, 0.0, 0.0);
        store.save_key_result(&kr).unwrap();
        let task_id = Uuid::new_v4();
        store.save_linked_task(&LinkedTask::new(kr.id, task_id)).unwrap();

        assert!(store.delete_key_result(kr.id).unwrap());
        assert!(store.find_key_result(kr.id).is_err());
        assert!(store.find_linked_tasks_by_task(task_id).unwrap().is_empty());
        assert!(!store.delete_linked_task(kr.id, task_id).unwrap());
    }

    #[test]
    fn failed_transaction_restores_files() {
        let dir = tempdir().unwrap();
        let store = JsonFileGoalRepository::new(dir.path()).unwrap();

        let mut kr = KeyResult::new(Uuid::new_v4(), "Revenue", MetricType::Currency, 0.0, 10.0);
        store.save_key_result(&kr).unwrap();
        let fresh = make_objective("Fresh");

        let result: GoalResult<()> = store.transaction(|| {
            kr.progress = 70.0;
            store.save_key_result(&kr)?;
            store.save_objective(&fresh)?;
            Err(GoalError::Validation("abort".to_string()))
        });
        assert!(result.is_err());

        // Overwritten file restored, newly created file removed.
        assert_eq!(store.find_key_result(kr.id).unwrap().progress, 0.0);
        assert!(store.find_objective(fresh.id).is_err());
    }

    #[test]
    fn rollback_keeps_writes_from_other_threads() {
        let dir = tempdir().unwrap();
        let store = JsonFileGoalRepository::new(dir.path()).unwrap();
        let fresh = make_objective("Fresh");
        let other = KeyResult::new(Uuid::new_v4(), "Other", MetricType::Number, 0.0, 10.0);
        let (started_tx, started_rx) = mpsc::channel();

        thread::scope(|s| {
            let (store, other) = (&store, &other);
            let writer = s.spawn(move || {
                started_rx.recv().unwrap();
                store.save_key_result(other)
            });

            let result: GoalResult<()> = store.transaction(|| {
                store.save_objective(&fresh)?;
                started_tx.send(()).unwrap();
                thread::sleep(StdDuration::from_millis(50));
                Err(GoalError::Validation("abort".to_string()))
            });
            assert!(result.is_err());
            writer.join().unwrap().unwrap();
        });

        assert!(store.find_objective(fresh.id).is_err());
        assert_eq!(store.find_key_result(other.id).unwrap().title, "Other");
    }

    #[test]
    fn corrupt_record_fails_reads() {
        let dir = tempdir().unwrap();
        let store = JsonFileGoalRepository::new(dir.path()).unwrap();

        let obj = make_objective("Goal");
        let good = KeyResult::new(obj.id, "Good", MetricType::Boolean, 0.0, 1.0);
        let bad = KeyResult::new(obj.id, "Bad", MetricType::Number, 0.0, 10.0);
        store.save_key_result(&good).unwrap();
        store.save_key_result(&bad).unwrap();
        fs::write(store.key_result_file(bad.id), "{\"id\": ").unwrap();
        fs::write(dir.path().join(KEY_RESULTS_DIR).join("notes.txt"), "ignored").unwrap();

        let err = store.find_key_results_by_objective(obj.id).unwrap_err();
        assert!(matches!(err, GoalError::CorruptRecord { ref path, .. } if path.contains(&bad.id.to_string())));
        assert!(matches!(
            store.find_key_result(bad.id),
            Err(GoalError::CorruptRecord { .. })
        ));
        assert_eq!(store.find_key_result(good.id).unwrap().title, "Good");
    }

    #[test]
    fn store_survives_reopen() {
        let dir = tempdir().unwrap();
        let store_path = dir.path().join("store");
        let obj = make_objective("Persistent");

        {
            let store = JsonFileGoalRepository::new(&store_path).unwrap();
            store.save_objective(&obj).unwrap();
        }

        {
            let store = JsonFileGoalRepository::new(&store_path).unwrap();
            assert_eq!(store.find_objective(obj.id).unwrap().title, "Persistent");
        }
    }
}
