//! # okr-goal
//!
//! Progress propagation for OKRs (Objectives and Key Results).
//!
//! Leaves of the hierarchy are edited by people or integrations: key result
//! values, task links and task statuses. Everything above them is derived.
//! The engine recomputes key result progress, rolls it up into objective
//! progress, and infers each objective's status from how far along it is
//! compared to how much of its period has elapsed.
//!
//! ## Key components
//!
//! - [`calculate_progress`] - pure progress formula for every [`MetricType`]
//! - [`infer_status`] - time-aware status rules (at-risk detection with
//!   hysteresis on recovery)
//! - [`ProgressPropagator`] - entry points that run a full recompute chain
//!   inside one repository transaction
//! - [`GoalRepository`] - storage contract, with [`InMemoryGoalRepository`]
//!   and [`JsonFileGoalRepository`] implementations
//! - [`OkrEvent`] / [`EventDispatcher`] - change notifications, delivered
//!   after commit
//! - [`with_conflict_retry`] - re-runs a propagation that lost an
//!   optimistic-concurrency race

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
mod gate;
pub mod key_result;
pub mod memory;
pub mod metric;
pub mod objective;
pub mod propagator;
pub mod repository;
pub mod retry;
pub mod status;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{EngineConfig, OkrConfig};
pub use error::{GoalError, GoalResult, RecordKind};
pub use events::{EventDispatcher, EventSink, JournalSink, OkrEvent};
pub use key_result::{KeyResult, LinkedTask, MetricType, TaskSnapshot, TaskStatus};
pub use memory::InMemoryGoalRepository;
pub use metric::{calculate_progress, MetricInput, TaskWeighting};
pub use objective::{Objective, ObjectiveStatus, Period};
pub use propagator::{aggregate_progress, KeyResultMutation, ProgressPropagator};
pub use repository::GoalRepository;
pub use retry::with_conflict_retry;
pub use status::{expected_progress, infer_status, StatusAssessment, StatusPolicy};
pub use store::JsonFileGoalRepository;
