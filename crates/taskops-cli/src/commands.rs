use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use taskops_core::{config::TaskopsConfig, loader, Schedule, TaskStatus};
use taskops_scheduler::{
    RunRecord, RunStore, ScheduleEngine, ShellRunner, SqliteRunStore, SystemClock,
};
use tracing::{info, warn};

/// `taskops run`: schedule every enabled task until Ctrl-C.
pub async fn run(config: TaskopsConfig) -> anyhow::Result<()> {
    let tasks_dir = &config.scheduler.tasks_dir;
    let report = loader::load_dir(tasks_dir, config.runner.default_timeout())
        .with_context(|| format!("loading tasks from {}", tasks_dir.display()))?;
    for (file, err) in &report.errors {
        warn!(file = %file.display(), code = err.code(), "{err}");
    }

    ensure_parent_dir(&config.database.path);
    info!(path = %config.database.path.display(), "opening SQLite database");
    let store = SqliteRunStore::open(&config.database.path)
        .with_context(|| format!("opening {}", config.database.path.display()))?;

    let runner = ShellRunner::new(config.runner.shell.clone(), config.runner.max_output_chars);
    let engine = Arc::new(ScheduleEngine::with_clock(
        Arc::new(runner),
        Arc::new(store),
        Arc::new(SystemClock),
        config.scheduler.tick(),
    ));

    let mut registered = 0usize;
    for task in report.enabled_tasks() {
        match engine.register(task.clone()) {
            Ok(()) => registered += 1,
            Err(e) if e.is_registration_error() => {
                warn!(task = %task.name, "task not scheduled: {e}")
            }
            Err(e) => return Err(e.into()),
        }
    }
    let disabled = report.tasks.len() - report.enabled_tasks().count();
    if disabled > 0 {
        info!(disabled, "disabled tasks not scheduled");
    }
    if registered == 0 {
        warn!(dir = %tasks_dir.display(), "no tasks scheduled");
    }

    tokio::spawn(handle_ctrl_c(Arc::clone(&engine)));

    engine.start().await?;
    Ok(())
}

/// First Ctrl-C stops the engine and lets in-flight runs finish.
/// A second one exits immediately.
async fn handle_ctrl_c(engine: Arc<ScheduleEngine>) {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("cannot listen for Ctrl-C");
        return;
    }
    info!("interrupt received, finishing in-flight runs (Ctrl-C again to abort)");
    engine.stop();

    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("second interrupt, aborting in-flight runs");
        std::process::exit(130);
    }
}

/// `taskops validate`: report every definition and every problem.
///
/// Returns `false` if anything would be rejected.
pub fn validate(config: &TaskopsConfig) -> anyhow::Result<bool> {
    let report = loader::load_dir(&config.scheduler.tasks_dir, config.runner.default_timeout())?;
    let now = Utc::now();
    let mut problems = report.errors.len();
    let mut seen: HashMap<&str, &Path> = HashMap::new();

    for loaded in &report.tasks {
        let task = &loaded.task;
        let file = loaded.file.display();
        if let Some(first) = seen.insert(&task.name, &loaded.file) {
            problems += 1;
            println!(
                "error {file}: [DUPLICATE_TASK] {} already defined in {}",
                task.name,
                first.display()
            );
            continue;
        }

        let mut notes = Vec::new();
        if !loaded.enabled {
            notes.push("disabled".to_string());
        }
        if let Schedule::OneTime { start_time } = task.schedule {
            if start_time < now {
                notes.push("start_time has passed, will not be scheduled".to_string());
            }
        }
        if !task.dependencies.is_empty() {
            let deps: Vec<&str> = task.dependencies.iter().map(String::as_str).collect();
            notes.push(format!("after {}", deps.join(", ")));
        }
        let notes = if notes.is_empty() {
            String::new()
        } else {
            format!(" ({})", notes.join("; "))
        };
        println!("ok    {:<24} {}{notes}", task.name, describe_schedule(&task.schedule));
    }

    for (file, err) in &report.errors {
        println!("error {}: [{}] {err}", file.display(), err.code());
    }

    println!(
        "{} task(s), {problems} problem(s) in {}",
        report.tasks.len(),
        config.scheduler.tasks_dir.display()
    );
    Ok(problems == 0)
}

#[derive(Debug, Serialize)]
struct TaskStatusView {
    name: String,
    last_run: Option<DateTime<Utc>>,
    last_status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    recent: Vec<RunRecord>,
}

/// `taskops status`: last run, last status and recent history.
///
/// Returns `false` when a named task has no recorded run.
pub fn status(
    config: &TaskopsConfig,
    name: Option<&str>,
    json: bool,
    limit: usize,
) -> anyhow::Result<bool> {
    let path = &config.database.path;
    if !path.exists() {
        println!("no database at {}; nothing has run yet", path.display());
        return Ok(name.is_none());
    }
    let store = SqliteRunStore::open(path).with_context(|| format!("opening {}", path.display()))?;

    let views = match name {
        Some(name) => {
            let Some((last_run, last_status)) = store.last_completion(name)? else {
                println!("no runs recorded for {name}");
                return Ok(false);
            };
            vec![TaskStatusView {
                name: name.to_string(),
                last_run: Some(last_run),
                last_status: Some(last_status),
                recent: store.recent_runs(name, limit)?,
            }]
        }
        None => store
            .all_states()?
            .into_iter()
            .map(|s| TaskStatusView {
                name: s.name,
                last_run: Some(s.last_run),
                last_status: Some(s.last_status),
                recent: Vec::new(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(true);
    }

    if views.is_empty() {
        println!("no runs recorded");
    }
    for view in &views {
        println!(
            "{:<24} {:<8} {}",
            view.name,
            view.last_status.map(|s| s.to_string()).unwrap_or_default(),
            view.last_run.map(|t| t.to_rfc3339()).unwrap_or_default()
        );
        for run in &view.recent {
            println!("    {}  {}", run.finished_at.to_rfc3339(), run.status);
        }
    }
    Ok(true)
}

/// `every 6h`, `at 2030-01-01T00:00:00+00:00`.
pub fn describe_schedule(schedule: &Schedule) -> String {
    match schedule {
        Schedule::Recurring { interval } => format!("every {}", format_interval(*interval)),
        Schedule::OneTime { start_time } => format!("at {}", start_time.to_rfc3339()),
    }
}

/// Largest whole unit from the interval grammar, seconds otherwise.
fn format_interval(interval: Duration) -> String {
    const UNITS: [(u64, &str); 4] = [(365 * 86_400, "y"), (86_400, "d"), (3_600, "h"), (60, "m")];
    let secs = interval.as_secs();
    for (size, suffix) in UNITS {
        if secs > 0 && secs % size == 0 {
            return format!("{}{suffix}", secs / size);
        }
    }
    format!("{secs}s")
}

fn ensure_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
