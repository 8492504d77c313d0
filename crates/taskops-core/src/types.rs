use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskopsError};

/// Outcome recorded for a finished trigger.
///
/// "Never ran" is represented as `Option::<TaskStatus>::None` by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The command exited with status 0.
    Success,
    /// The command exited non-zero on its final attempt.
    Failed,
    /// The command exceeded its timeout on its final attempt.
    Timeout,
    /// The command could not be launched on its final attempt.
    Error,
}

impl TaskStatus {
    pub fn is_success(self) -> bool {
        matches!(self, TaskStatus::Success)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::Timeout => "timeout",
            TaskStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(TaskStatus::Success),
            "failed" => Ok(TaskStatus::Failed),
            "timeout" => Ok(TaskStatus::Timeout),
            "error" => Ok(TaskStatus::Error),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// When a task fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Fire every `interval`, measured from the completion of the previous trigger.
    Recurring { interval: Duration },
    /// Fire exactly once at `start_time`.
    OneTime { start_time: DateTime<Utc> },
}

/// Fixed-delay retry settings. `max_attempts` counts the first execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(60),
        }
    }
}

/// A validated task ready for registration with the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique key across the registry.
    pub name: String,
    /// Opaque command string handed to the runner.
    pub command: String,
    pub schedule: Schedule,
    pub retry: RetryConfig,
    /// Names of tasks that must have run at least once. May name tasks that
    /// are not registered (yet).
    pub dependencies: BTreeSet<String>,
    /// Per-execution timeout enforced by the runner; `None` means unbounded.
    pub timeout: Option<Duration>,
}

impl Task {
    pub fn new(name: impl Into<String>, command: impl Into<String>, schedule: Schedule) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            schedule,
            retry: RetryConfig::default(),
            dependencies: BTreeSet::new(),
            timeout: None,
        }
    }

    pub fn recurring(name: impl Into<String>, command: impl Into<String>, interval: Duration) -> Self {
        Self::new(name, command, Schedule::Recurring { interval })
    }

    pub fn one_time(
        name: impl Into<String>,
        command: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self::new(name, command, Schedule::OneTime { start_time })
    }

    pub fn with_retry(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.retry = RetryConfig { max_attempts, delay };
        self
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Check the structural invariants of a task.
    ///
    /// Time-relative checks (a one-time start in the past) belong to the
    /// scheduler, which knows "now".
    pub fn check(&self) -> Result<()> {
        let name = self.name.as_str();
        if name.trim().is_empty() {
            return Err(TaskopsError::validation("<unnamed>", "name must not be empty"));
        }
        if self.command.trim().is_empty() {
            return Err(TaskopsError::validation(name, "command must not be empty"));
        }
        if let Schedule::Recurring { interval } = self.schedule {
            if interval.is_zero() {
                return Err(TaskopsError::validation(name, "interval must be positive"));
            }
        }
        if self.retry.max_attempts < 1 {
            return Err(TaskopsError::validation(name, "retry.max_attempts must be >= 1"));
        }
        if self.dependencies.contains(name) {
            return Err(TaskopsError::validation(name, "task cannot depend on itself"));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(TaskopsError::validation(name, "timeout must be positive"));
        }
        Ok(())
    }
}
