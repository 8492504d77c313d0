//! `taskops-scheduler`: single-process task scheduling engine.
//!
//! # Overview
//!
//! [`ScheduleEngine`] owns a min-heap of fire times and ticks on a fixed
//! cadence. Each due task is handed to the [`ExecutionCoordinator`] on its own
//! tokio task, which:
//!
//! 1. takes the per-task single-flight guard (a concurrent trigger is dropped),
//! 2. asks the [`DependencyGate`] whether every dependency has run at least once,
//! 3. invokes the [`Runner`] and retries failures per [`RetryPolicy`],
//! 4. records the final status through the [`RunStore`].
//!
//! Recurring tasks are then re-queued at `completion + interval`; one-time
//! tasks are retired.
//!
//! # Capabilities
//!
//! | Trait        | Implementations                        |
//! |--------------|----------------------------------------|
//! | [`Runner`]   | [`ShellRunner`]                        |
//! | [`RunStore`] | [`SqliteRunStore`], [`MemoryRunStore`] |
//! | [`Clock`]    | [`SystemClock`], [`MonotonicClock`]    |

pub mod clock;
pub mod coordinator;
pub mod db;
pub mod engine;
pub mod error;
pub mod flight;
pub mod gate;
pub mod registry;
pub mod retry;
pub mod runner;
pub mod store;

pub use clock::{Clock, MonotonicClock, SystemClock};
pub use coordinator::{ExecutionCoordinator, RunReport};
pub use db::{RunRecord, SqliteRunStore, StateRecord};
pub use engine::ScheduleEngine;
pub use error::{Result, SchedulerError};
pub use gate::DependencyGate;
pub use registry::{TaskRegistry, TaskSnapshot, TaskState};
pub use retry::{RetryDecision, RetryPolicy};
pub use runner::{FailureKind, RunOutcome, Runner, ShellRunner};
pub use store::{MemoryRunStore, RunStore};
