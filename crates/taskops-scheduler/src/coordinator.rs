//! Drives one trigger of one task: guard, dependency check, run, retry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use taskops_core::{Task, TaskStatus};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    clock::Clock,
    flight::SingleFlight,
    gate::DependencyGate,
    registry::TaskRegistry,
    retry::{RetryDecision, RetryPolicy},
    runner::{RunOutcome, Runner},
    store::RunStore,
};

/// How a trigger ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
    /// Another trigger of the same task was still in flight.
    Dropped,
    /// At least one dependency has never run. Nothing was executed.
    Skipped { missing: Vec<String> },
    /// The runner was invoked `attempts` times; `status` is the final result.
    Finished {
        status: TaskStatus,
        attempts: u32,
        completed_at: DateTime<Utc>,
    },
}

pub struct ExecutionCoordinator {
    runner: Arc<dyn Runner>,
    store: Arc<dyn RunStore>,
    registry: Arc<TaskRegistry>,
    gate: DependencyGate,
    flights: SingleFlight,
    clock: Arc<dyn Clock>,
}

impl ExecutionCoordinator {
    pub fn new(
        runner: Arc<dyn Runner>,
        store: Arc<dyn RunStore>,
        registry: Arc<TaskRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gate: DependencyGate::new(Arc::clone(&store)),
            runner,
            store,
            registry,
            flights: SingleFlight::new(),
            clock,
        }
    }

    /// True while a trigger of `name` holds the single-flight guard.
    pub fn is_running(&self, name: &str) -> bool {
        self.flights.is_running(name)
    }

    /// Run one trigger of `task` to its conclusion.
    ///
    /// Retry sleeps happen inside this future, so callers that must not block
    /// (the engine tick loop) spawn it. Run-state is written to the current
    /// registration of `task.name`, if any.
    pub async fn run_once(&self, task: &Task) -> RunReport {
        let generation = self.registry.generation(&task.name);
        self.run_trigger(task, generation).await
    }

    /// [`run_once`](Self::run_once) for a trigger dispatched from the
    /// registration `generation`. Registry writes from a registration that
    /// has since been replaced are dropped.
    #[instrument(skip_all, fields(task = %task.name))]
    pub(crate) async fn run_trigger(&self, task: &Task, generation: Option<u64>) -> RunReport {
        let Some(_guard) = self.flights.try_acquire(&task.name) else {
            warn!("previous trigger still running, dropping this one");
            return RunReport::Dropped;
        };

        if let Some(generation) = generation {
            self.registry.begin_cycle(&task.name, generation);
        }

        let missing = self.gate.missing(task);
        if !missing.is_empty() {
            info!(?missing, "dependencies have not run yet, skipping trigger");
            return RunReport::Skipped { missing };
        }

        let mut attempts = 0u32;
        let status = loop {
            attempts += 1;
            if let Some(generation) = generation {
                self.registry.record_attempt(&task.name, generation, attempts);
            }

            let outcome = self.runner.run(&task.command, task.timeout).await;
            log_outcome(attempts, &outcome);
            let Some(kind) = outcome.failure() else {
                break TaskStatus::Success;
            };

            match RetryPolicy::decide(&task.retry, attempts) {
                RetryDecision::RetryAfter(delay) => {
                    info!(attempt = attempts, ?kind, ?delay, "attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => break kind.terminal_status(),
            }
        };

        let completed_at = self.clock.now();
        if let Err(e) = self.store.record_completion(&task.name, completed_at, status) {
            error!(%status, "failed to persist completion: {e}");
        }
        if let Some(generation) = generation {
            self.registry.record_outcome(&task.name, generation, completed_at, status);
        }

        if status.is_success() {
            info!(attempts, "task succeeded");
        } else {
            warn!(attempts, %status, "task failed, giving up for this trigger");
        }

        RunReport::Finished {
            status,
            attempts,
            completed_at,
        }
    }
}

fn log_outcome(attempt: u32, outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Exited {
            exit_code: 0,
            stdout,
            stderr,
        } => debug!(attempt, stdout = %stdout, stderr = %stderr, "command exited 0"),
        RunOutcome::Exited {
            exit_code,
            stdout,
            stderr,
        } => warn!(attempt, exit_code, stdout = %stdout, stderr = %stderr, "command exited non-zero"),
        RunOutcome::TimedOut { after } => warn!(attempt, ?after, "command timed out"),
        RunOutcome::LaunchFailed { reason } => warn!(attempt, "command could not be launched: {reason}"),
    }
}
