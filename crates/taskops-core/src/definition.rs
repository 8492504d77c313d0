//! On-disk task definition format and its validation into [`Task`].
//!
//! ```yaml
//! tasks:
//!   - name: nightly_backup
//!     command: ./backup.sh
//!     schedule:
//!       type: recurring
//!       interval: 1d
//!     retry:
//!       max_attempts: 3
//!       delay: 60
//!     dependencies: [db_dump]
//!     timeout: 900
//! ```

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskopsError};
use crate::interval::parse_interval;
use crate::types::{RetryConfig, Schedule, Task};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub name: String,
    pub command: String,
    pub schedule: ScheduleDefinition,
    #[serde(default)]
    pub retry: RetryDefinition,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Per-execution timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Disabled entries are validated but never registered.
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    /// `"recurring"` or `"one-time"`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    /// RFC 3339, or naive `YYYY-MM-DD HH:MM[:SS]` taken as UTC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryDefinition {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,
    /// Seconds between attempts.
    #[serde(default = "default_delay")]
    pub delay: i64,
}

impl Default for RetryDefinition {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay: default_delay(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_max_attempts() -> i64 {
    3
}
fn default_delay() -> i64 {
    60
}

impl TaskDefinition {
    /// Resolve into a [`Task`], applying `default_timeout` when the entry has
    /// no timeout of its own.
    pub fn validate(&self, default_timeout: Option<Duration>) -> Result<Task> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(TaskopsError::validation("<unnamed>", "name must not be empty"));
        }

        let schedule = match self.schedule.kind.as_str() {
            "recurring" => {
                let raw = self.schedule.interval.as_deref().ok_or_else(|| {
                    TaskopsError::validation(name, "recurring schedule requires `interval`")
                })?;
                Schedule::Recurring {
                    interval: parse_interval(raw)?,
                }
            }
            "one-time" => {
                let raw = self.schedule.start_time.as_deref().ok_or_else(|| {
                    TaskopsError::validation(name, "one-time schedule requires `start_time`")
                })?;
                Schedule::OneTime {
                    start_time: parse_start_time(raw).ok_or_else(|| {
                        TaskopsError::validation(name, format!("unparsable start_time {raw:?}"))
                    })?,
                }
            }
            other => {
                return Err(TaskopsError::validation(
                    name,
                    format!("schedule type must be 'recurring' or 'one-time', got {other:?}"),
                ))
            }
        };

        if self.retry.max_attempts < 1 {
            return Err(TaskopsError::validation(name, "retry.max_attempts must be >= 1"));
        }
        if self.retry.delay < 1 {
            return Err(TaskopsError::validation(name, "retry.delay must be >= 1 second"));
        }
        let max_attempts = u32::try_from(self.retry.max_attempts)
            .map_err(|_| TaskopsError::validation(name, "retry.max_attempts is too large"))?;

        let timeout = match self.timeout {
            Some(0) => return Err(TaskopsError::validation(name, "timeout must be positive")),
            Some(secs) => Some(Duration::from_secs(secs)),
            None => default_timeout,
        };

        let task = Task {
            name: name.to_string(),
            command: self.command.clone(),
            schedule,
            retry: RetryConfig {
                max_attempts,
                delay: Duration::from_secs(self.retry.delay as u64),
            },
            dependencies: self.dependencies.iter().map(|d| d.trim().to_string()).collect(),
            timeout,
        };
        task.check()?;
        Ok(task)
    }
}

/// Accept RFC 3339 or a naive timestamp interpreted as UTC.
pub fn parse_start_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(yaml: &str) -> TaskDefinition {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn recurring_with_defaults() {
        let task = def(
            r#"
name: sync
command: echo hi
schedule: { type: recurring, interval: 30m }
"#,
        )
        .validate(None)
        .unwrap();

        assert_eq!(
            task.schedule,
            Schedule::Recurring {
                interval: Duration::from_secs(1_800)
            }
        );
        assert_eq!(task.retry, RetryConfig::default());
        assert!(task.dependencies.is_empty());
        assert_eq!(task.timeout, None);
    }

    #[test]
    fn one_time_naive_start_is_utc() {
        let task = def(
            r#"
name: cleanup
command: rm -rf /tmp/scratch
schedule: { type: one-time, start_time: "2030-05-01 08:30:00" }
retry: { max_attempts: 2, delay: 5 }
dependencies: [sync]
"#,
        )
        .validate(None)
        .unwrap();

        match task.schedule {
            Schedule::OneTime { start_time } => {
                assert_eq!(start_time.to_rfc3339(), "2030-05-01T08:30:00+00:00")
            }
            other => panic!("expected one-time, got {other:?}"),
        }
        assert_eq!(task.retry.max_attempts, 2);
        assert!(task.dependencies.contains("sync"));
    }

    #[test]
    fn rfc3339_offset_is_normalised() {
        let t = parse_start_time("2030-01-01T12:00:00+02:00").unwrap();
        assert_eq!(t.to_rfc3339(), "2030-01-01T10:00:00+00:00");
        assert!(parse_start_time("tomorrow").is_none());
    }

    #[test]
    fn default_timeout_applies_only_when_unset() {
        let d = def("{name: a, command: x, schedule: {type: recurring, interval: 1h}}");
        assert_eq!(
            d.validate(Some(Duration::from_secs(30))).unwrap().timeout,
            Some(Duration::from_secs(30))
        );

        let d = def("{name: a, command: x, timeout: 5, schedule: {type: recurring, interval: 1h}}");
        assert_eq!(
            d.validate(Some(Duration::from_secs(30))).unwrap().timeout,
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn bad_interval_surfaces_as_invalid_interval() {
        let err = def("{name: a, command: x, schedule: {type: recurring, interval: 5x}}")
            .validate(None)
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INTERVAL");
    }

    #[test]
    fn structural_problems_are_validation_errors() {
        let cases = [
            "{name: a, command: x, schedule: {type: weekly}}",
            "{name: a, command: x, schedule: {type: recurring}}",
            "{name: a, command: x, schedule: {type: one-time}}",
            "{name: a, command: x, schedule: {type: one-time, start_time: soon}}",
            "{name: a, command: x, schedule: {type: recurring, interval: 1h}, retry: {max_attempts: 0}}",
            "{name: a, command: x, schedule: {type: recurring, interval: 1h}, retry: {delay: 0}}",
            "{name: a, command: x, schedule: {type: recurring, interval: 1h}, dependencies: [a]}",
            "{name: a, command: x, schedule: {type: recurring, interval: 1h}, timeout: 0}",
            "{name: '  ', command: x, schedule: {type: recurring, interval: 1h}}",
            "{name: a, command: '', schedule: {type: recurring, interval: 1h}}",
        ];
        for yaml in cases {
            let err = def(yaml).validate(None).unwrap_err();
            assert_eq!(err.code(), "CONFIG_VALIDATION", "{yaml}");
        }
    }
}
