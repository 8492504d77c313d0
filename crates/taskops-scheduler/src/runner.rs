//! Command execution capability consumed by the coordinator.

use std::time::Duration;

use async_trait::async_trait;
use taskops_core::TaskStatus;
use taskops_shell::{ExecOptions, ShellError, ShellExecutor};
use tracing::warn;

/// What happened to one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The process ran to completion (any exit code).
    Exited {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    /// The process exceeded its timeout and was killed.
    TimedOut { after: Duration },
    /// The process could not be started.
    LaunchFailed { reason: String },
}

/// Retryable failure classes. All three feed the same retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ExecutionFailure,
    ExecutionTimeout,
    LaunchError,
}

impl FailureKind {
    /// Status recorded when this is the last failure of a trigger.
    pub fn terminal_status(self) -> TaskStatus {
        match self {
            FailureKind::ExecutionFailure => TaskStatus::Failed,
            FailureKind::ExecutionTimeout => TaskStatus::Timeout,
            FailureKind::LaunchError => TaskStatus::Error,
        }
    }
}

impl RunOutcome {
    pub fn success() -> Self {
        RunOutcome::Exited {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn exit(exit_code: i32) -> Self {
        RunOutcome::Exited {
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// `None` on success, otherwise the failure class.
    pub fn failure(&self) -> Option<FailureKind> {
        match self {
            RunOutcome::Exited { exit_code: 0, .. } => None,
            RunOutcome::Exited { .. } => Some(FailureKind::ExecutionFailure),
            RunOutcome::TimedOut { .. } => Some(FailureKind::ExecutionTimeout),
            RunOutcome::LaunchFailed { .. } => Some(FailureKind::LaunchError),
        }
    }
}

/// Executes a task's command. The coordinator never looks inside `command`.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, command: &str, timeout: Option<Duration>) -> RunOutcome;
}

/// [`Runner`] backed by `<shell> -c <command>`.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    executor: ShellExecutor,
    max_output_chars: usize,
}

impl ShellRunner {
    pub fn new(shell: impl Into<String>, max_output_chars: usize) -> Self {
        Self {
            executor: ShellExecutor::new(shell),
            max_output_chars,
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new("sh", taskops_shell::truncate::DEFAULT_MAX_CHARS)
    }
}

#[async_trait]
impl Runner for ShellRunner {
    async fn run(&self, command: &str, timeout: Option<Duration>) -> RunOutcome {
        let options = ExecOptions {
            timeout,
            max_output_chars: self.max_output_chars,
        };
        match self.executor.exec(command, &options).await {
            Ok(result) => RunOutcome::Exited {
                exit_code: result.exit_code,
                stdout: result.stdout,
                stderr: result.stderr,
            },
            Err(ShellError::Timeout { ms }) => RunOutcome::TimedOut {
                after: Duration::from_millis(ms),
            },
            Err(ShellError::Spawn(reason)) => RunOutcome::LaunchFailed { reason },
            Err(ShellError::Io(e)) => {
                warn!(shell = %self.executor.shell(), "collecting child output failed: {e}");
                RunOutcome::LaunchFailed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(RunOutcome::success().failure(), None);
        assert_eq!(
            RunOutcome::exit(2).failure(),
            Some(FailureKind::ExecutionFailure)
        );
        assert_eq!(
            RunOutcome::TimedOut {
                after: Duration::from_secs(1)
            }
            .failure()
            .map(FailureKind::terminal_status),
            Some(TaskStatus::Timeout)
        );
        assert_eq!(
            RunOutcome::LaunchFailed {
                reason: "nope".into()
            }
            .failure()
            .map(FailureKind::terminal_status),
            Some(TaskStatus::Error)
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_runner_maps_outcomes() {
        let runner = ShellRunner::default();
        assert_eq!(runner.run("exit 0", None).await.failure(), None);
        assert_eq!(
            runner.run("exit 7", None).await,
            RunOutcome::exit(7)
        );
        assert!(matches!(
            runner.run("sleep 5", Some(Duration::from_millis(100))).await,
            RunOutcome::TimedOut { .. }
        ));

        let missing = ShellRunner::new("/nonexistent/shell", 100);
        assert!(matches!(
            missing.run("true", None).await,
            RunOutcome::LaunchFailed { .. }
        ));
    }
}
