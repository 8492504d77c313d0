//! Load task definitions from a directory of YAML files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::definition::TaskDefinition;
use crate::error::{Result, TaskopsError};
use crate::types::Task;

/// One valid entry, tagged with the file it came from.
#[derive(Debug, Clone)]
pub struct LoadedTask {
    pub task: Task,
    pub enabled: bool,
    pub file: PathBuf,
}

/// Everything found in a tasks directory: valid tasks plus per-file and
/// per-entry errors. One bad entry never hides its siblings.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub tasks: Vec<LoadedTask>,
    pub errors: Vec<(PathBuf, TaskopsError)>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Enabled tasks only, in load order.
    pub fn enabled_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.enabled).map(|t| &t.task)
    }
}

#[derive(Deserialize)]
struct TaskFile {
    #[serde(default)]
    tasks: Vec<serde_yaml::Value>,
}

/// Read every `*.yaml` / `*.yml` file in `dir`, in lexical order.
///
/// A missing directory is a `Config` error; anything wrong inside a file is
/// collected into the report instead.
pub fn load_dir(dir: &Path, default_timeout: Option<Duration>) -> Result<LoadReport> {
    if !dir.is_dir() {
        return Err(TaskopsError::Config(format!(
            "tasks directory not found: {}",
            dir.display()
        )));
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
        })
        .collect();
    files.sort();

    let mut report = LoadReport::default();
    for file in files {
        let text = match std::fs::read_to_string(&file) {
            Ok(t) => t,
            Err(e) => {
                warn!(file = %file.display(), "cannot read task file: {e}");
                report.errors.push((file, TaskopsError::Io(e)));
                continue;
            }
        };
        load_str(&text, &file, default_timeout, &mut report);
    }
    Ok(report)
}

/// Parse one file's contents into `report`.
pub fn load_str(
    text: &str,
    file: &Path,
    default_timeout: Option<Duration>,
    report: &mut LoadReport,
) {
    // An empty file deserialises to `null`; treat it as zero tasks.
    if text.trim().is_empty() {
        return;
    }
    let parsed: TaskFile = match serde_yaml::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            warn!(file = %file.display(), "invalid task file: {e}");
            report.errors.push((
                file.to_path_buf(),
                TaskopsError::Yaml {
                    file: file.display().to_string(),
                    reason: e.to_string(),
                },
            ));
            return;
        }
    };

    for (index, value) in parsed.tasks.into_iter().enumerate() {
        let label = value
            .get("name")
            .and_then(|n| n.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}#{index}", file.display()));

        let result = serde_yaml::from_value::<TaskDefinition>(value)
            .map_err(|e| TaskopsError::ConfigValidation {
                task: label.clone(),
                reason: e.to_string(),
            })
            .and_then(|def| def.validate(default_timeout).map(|task| (task, def.enabled)));

        match result {
            Ok((task, enabled)) => {
                debug!(task = %task.name, enabled, "task definition loaded");
                report.tasks.push(LoadedTask {
                    task,
                    enabled,
                    file: file.to_path_buf(),
                });
            }
            Err(e) => {
                warn!(task = %label, file = %file.display(), "rejected task definition: {e}");
                report.errors.push((file.to_path_buf(), e));
            }
        }
    }
}
