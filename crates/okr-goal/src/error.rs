// error.rs - Error types for the progress propagation engine.

use thiserror::Error;
use uuid::Uuid;

/// Result alias used throughout the engine.
pub type GoalResult<T> = Result<T, GoalError>;

/// The kind of record a lookup failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Objective,
    KeyResult,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Objective => write!(f, "objective"),
            RecordKind::KeyResult => write!(f, "key result"),
        }
    }
}

/// Errors that can occur while tracking objectives and key results.
///
/// Progress and status computation are total, so no variant covers a
/// failed computation.
#[derive(Debug, Error)]
pub enum GoalError {
    /// The requested objective or key result does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: Uuid },

    /// A key result's metric fields are internally inconsistent.
    #[error("invalid state for key result {id}: {reason}")]
    InvalidState { id: Uuid, reason: String },

    /// Caller input was rejected before it reached storage.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An objective was written from a stale revision.
    #[error("conflicting write to objective {objective_id}: expected revision {expected}, found {found}")]
    Conflict {
        objective_id: Uuid,
        expected: u64,
        found: u64,
    },

    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    /// Failed to serialize/deserialize a record.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A stored record could not be parsed.
    #[error("corrupt record at {path}: {source}")]
    CorruptRecord {
        path: String,
        source: serde_json::Error,
    },

    /// The engine config file could not be parsed.
    #[error("config error in {path}: {message}")]
    ConfigError { path: String, message: String },

    /// An event sink failed (logged, never fatal to a propagation).
    #[error("event sink error: {0}")]
    SinkError(String),
}

impl GoalError {
    pub fn objective_not_found(id: Uuid) -> Self {
        GoalError::NotFound {
            kind: RecordKind::Objective,
            id,
        }
    }

    pub fn key_result_not_found(id: Uuid) -> Self {
        GoalError::NotFound {
            kind: RecordKind::KeyResult,
            id,
        }
    }

    /// Whether re-running the operation from fresh reads may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, GoalError::Conflict { .. })
    }
}
