//! Subscriber setup for the `taskops` binary.
//!
//! Filter comes from `TASKOPS_LOG` (e.g. `taskops_scheduler=debug`), falling
//! back to `logging.level` from the config file.

use std::path::Path;

use taskops_core::config::LoggingConfig;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::task_log::TaskFileLayer;

const LOG_FILE_PREFIX: &str = "taskops";
const LOG_FILE_SUFFIX: &str = "log";

/// Install the global subscriber.
///
/// With `to_file`, two file sinks are added under `config.dir`: the
/// process-wide `taskops.<date>.log` and one `<task>/<task>.<date>.log` per
/// task. Both rotate daily and keep at most `config.max_files` files. A log
/// directory that cannot be created downgrades to console-only output.
pub fn init_logging(config: &LoggingConfig, to_file: bool) {
    let env_filter = EnvFilter::try_from_env("TASKOPS_LOG")
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = fmt::layer().with_target(true).boxed();

    let (file_layer, task_layer) = if to_file {
        match daily_appender(&config.dir, LOG_FILE_PREFIX, config.max_files) {
            Ok(appender) => (
                Some(
                    fmt::layer()
                        .with_writer(appender)
                        .with_ansi(false)
                        .with_thread_ids(true)
                        .boxed(),
                ),
                Some(TaskFileLayer::new(&config.dir, config.max_files)),
            ),
            Err(e) => {
                eprintln!("Warning: cannot open log directory {}: {e}", config.dir.display());
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .with(task_layer)
        .init();
}

/// Daily-rotating `<prefix>.<YYYY-MM-DD>.log` files in `dir`.
///
/// Rotated files beyond `max_files` are deleted on rollover.
pub fn daily_appender(
    dir: &Path,
    prefix: &str,
    max_files: usize,
) -> Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(max_files.max(1))
        .build(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn process_log_is_dated_and_suffixed() {
        let dir = tempfile::tempdir().unwrap();
        let mut appender = daily_appender(dir.path(), LOG_FILE_PREFIX, 3).unwrap();
        appender.write_all(b"hello\n").unwrap();
        appender.flush().unwrap();

        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let path = dir.path().join(format!("taskops.{today}.log"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "hello\n");
    }

    #[test]
    fn missing_log_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        daily_appender(&nested, LOG_FILE_PREFIX, 0).unwrap();
        assert!(nested.is_dir());
    }
}
