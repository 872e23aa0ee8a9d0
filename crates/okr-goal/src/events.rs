// events.rs - Recalculation events and their sinks.
//
// The propagator emits an event for every derived value it changes, after
// the enclosing transaction has committed. Sinks only observe: a failing
// sink is logged and never fails the propagation that produced the event.
//
// The always-on sink is a JSONL journal (`.okr/journal.jsonl`), one event
// per line, easy to grep or feed to jq.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GoalError;
use crate::objective::ObjectiveStatus;

/// Events emitted when derived progress or status changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum OkrEvent {
    /// A key result's progress was recomputed to a new value.
    KeyResultRecalculated {
        key_result_id: Uuid,
        objective_id: Uuid,
        previous_progress: f64,
        progress: f64,
        timestamp: DateTime<Utc>,
    },

    /// An objective's aggregate progress changed.
    ObjectiveRecalculated {
        objective_id: Uuid,
        previous_progress: f64,
        progress: f64,
        timestamp: DateTime<Utc>,
    },

    /// An objective moved to a different status.
    ObjectiveStatusChanged {
        objective_id: Uuid,
        from_status: ObjectiveStatus,
        to_status: ObjectiveStatus,
        timestamp: DateTime<Utc>,
    },
}

impl OkrEvent {
    pub fn event_type(&self) -> &str {
        match self {
            OkrEvent::KeyResultRecalculated { .. } => "key_result_recalculated",
            OkrEvent::ObjectiveRecalculated { .. } => "objective_recalculated",
            OkrEvent::ObjectiveStatusChanged { .. } => "objective_status_changed",
        }
    }

    pub fn objective_id(&self) -> Uuid {
        match self {
            OkrEvent::KeyResultRecalculated { objective_id, .. }
            | OkrEvent::ObjectiveRecalculated { objective_id, .. }
            | OkrEvent::ObjectiveStatusChanged { objective_id, .. } => *objective_id,
        }
    }
}

/// Receives events from the propagator.
pub trait EventSink: Send {
    fn send(&self, event: &OkrEvent) -> Result<(), GoalError>;
}

/// Appends events as JSONL to a journal file.
pub struct JournalSink {
    path: PathBuf,
}

impl JournalSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl EventSink for JournalSink {
    fn send(&self, event: &OkrEvent) -> Result<(), GoalError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| GoalError::IoError {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| GoalError::IoError {
                path: self.path.display().to_string(),
                source,
            })?;

        let json = serde_json::to_string(event)?;
        writeln!(file, "{}", json).map_err(|source| GoalError::IoError {
            path: self.path.display().to_string(),
            source,
        })?;

        Ok(())
    }
}

/// Fans events out to every registered sink.
#[derive(Default)]
pub struct EventDispatcher {
    sinks: Vec<Box<dyn EventSink>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver an event to all sinks; sink errors are logged and skipped.
    pub fn dispatch(&self, event: &OkrEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(event) {
                tracing::warn!("event sink error ({}): {}", event.event_type(), e);
            }
        }
    }
}
