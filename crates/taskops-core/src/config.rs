use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TICK_MS: u64 = 1_000;
pub const DEFAULT_TASKS_DIR: &str = "config";
pub const DEFAULT_MAX_LOG_FILES: usize = 10;
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 16_000;

/// Top-level config (taskops.toml + TASKOPS_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskopsConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Engine tick cadence in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Directory scanned for `*.yaml` task definitions.
    #[serde(default = "default_tasks_dir")]
    pub tasks_dir: PathBuf,
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            tasks_dir: default_tasks_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
    /// Rotated log files kept per log (process-wide and per task); older ones go on rollover.
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
    /// Fallback filter directive when `TASKOPS_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            max_files: DEFAULT_MAX_LOG_FILES,
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Shell used as `<shell> -c <command>`.
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Applied to tasks that do not set their own `timeout`. Unset = no limit.
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
}

impl RunnerConfig {
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            default_timeout_secs: None,
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
        }
    }
}

fn default_tick_ms() -> u64 {
    DEFAULT_TICK_MS
}
fn default_tasks_dir() -> PathBuf {
    PathBuf::from(DEFAULT_TASKS_DIR)
}
fn default_max_log_files() -> usize {
    DEFAULT_MAX_LOG_FILES
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_shell() -> String {
    "sh".to_string()
}
fn default_max_output_chars() -> usize {
    DEFAULT_MAX_OUTPUT_CHARS
}
fn taskops_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".taskops")
}
fn default_db_path() -> PathBuf {
    taskops_home().join("taskops.db")
}
fn default_log_dir() -> PathBuf {
    taskops_home().join("logs")
}

impl TaskopsConfig {
    /// Load config from a TOML file with TASKOPS_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.taskops/taskops.toml
    ///
    /// A missing file is not an error; defaults fill every field. Nested keys
    /// use a double underscore, e.g. `TASKOPS_SCHEDULER__TICK_MS=500`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(PathBuf::from)
            .unwrap_or_else(default_config_path);
        Self::figment(path).extract().map_err(|e| crate::error::TaskopsError::Config(e.to_string()))
    }

    fn figment(path: PathBuf) -> Figment {
        Figment::from(Serialized::defaults(TaskopsConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("TASKOPS_").split("__").ignore(&["config", "log"]))
    }
}

fn default_config_path() -> PathBuf {
    taskops_home().join("taskops.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        figment::Jail::expect_with(|jail| {
            let cfg = TaskopsConfig::load(Some(
                jail.directory().join("missing.toml").to_str().unwrap(),
            ))
            .unwrap();
            assert_eq!(cfg.scheduler.tick_ms, DEFAULT_TICK_MS);
            assert_eq!(cfg.scheduler.tasks_dir, PathBuf::from("config"));
            assert_eq!(cfg.runner.shell, "sh");
            assert_eq!(cfg.runner.default_timeout(), None);
            Ok(())
        });
    }

    #[test]
    fn toml_then_env_override() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "taskops.toml",
                r#"
                [scheduler]
                tick_ms = 250
                tasks_dir = "/etc/taskops/tasks"

                [runner]
                default_timeout_secs = 120
                "#,
            )?;
            jail.set_env("TASKOPS_LOGGING__MAX_FILES", "3");
            jail.set_env("TASKOPS_RUNNER__SHELL", "bash");

            let cfg = TaskopsConfig::load(Some("taskops.toml")).unwrap();
            assert_eq!(cfg.scheduler.tick(), Duration::from_millis(250));
            assert_eq!(cfg.scheduler.tasks_dir, PathBuf::from("/etc/taskops/tasks"));
            assert_eq!(cfg.runner.default_timeout(), Some(Duration::from_secs(120)));
            assert_eq!(cfg.runner.shell, "bash");
            assert_eq!(cfg.logging.max_files, 3);
            Ok(())
        });
    }
}
