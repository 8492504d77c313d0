use chrono::{DateTime, Utc};
use taskops_core::TaskopsError;
use thiserror::Error;

/// Errors surfaced by the scheduling engine and its stores.
///
/// Per-trigger execution failures are not errors; they travel as
/// [`RunOutcome`](crate::runner::RunOutcome) values.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A non-SQLite store failure (lock poisoned, unreachable backend, ...).
    #[error("Store error: {0}")]
    Store(String),

    /// The task failed structural validation.
    #[error(transparent)]
    Definition(#[from] TaskopsError),

    /// A task with this name is already in the active schedule.
    #[error("Task already registered: {name}")]
    DuplicateTask { name: String },

    /// No task with the given name is registered.
    #[error("Task not found: {name}")]
    TaskNotFound { name: String },

    /// A one-time task whose start has already passed; it is never scheduled.
    #[error("One-time task {name} starts in the past ({start_time})")]
    StartTimeInPast {
        name: String,
        start_time: DateTime<Utc>,
    },

    /// `start()` was called while the engine loop is already running.
    #[error("Scheduler engine is already running")]
    AlreadyRunning,
}

impl SchedulerError {
    /// True for errors that reject a single registration rather than the engine.
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            SchedulerError::Definition(_)
                | SchedulerError::DuplicateTask { .. }
                | SchedulerError::StartTimeInPast { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
