//! Per-task log files.
//!
//! Any event recorded inside a span carrying a `task` field, or carrying a
//! `task` field itself, is also written to `<dir>/<task>/<task>.<date>.log`.
//! The coordinator opens such a span for every trigger, so a task's file holds
//! its attempts, captured output and final status.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::logging::daily_appender;

const TASK_FIELD: &str = "task";

/// Span extension holding the task a span belongs to.
struct TaskName(String);

/// Collects the message, the `task` field and the remaining fields of an event.
#[derive(Default)]
struct FieldVisitor {
    task: Option<String>,
    message: Option<String>,
    fields: Vec<(&'static str, String)>,
}

impl FieldVisitor {
    fn put(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            TASK_FIELD => self.task = Some(value),
            name => self.fields.push((name, value)),
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }
}

pub struct TaskFileLayer {
    dir: PathBuf,
    max_files: usize,
    writers: Mutex<HashMap<String, Option<RollingFileAppender>>>,
}

impl TaskFileLayer {
    pub fn new(dir: &Path, max_files: usize) -> Self {
        Self {
            dir: dir.to_path_buf(),
            max_files,
            writers: Mutex::new(HashMap::new()),
        }
    }

    fn write_line(&self, task: &str, line: &str) {
        let mut writers = self.writers.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = writers.entry(task.to_string()).or_insert_with(|| {
            let name = file_stem(task);
            match daily_appender(&self.dir.join(&name), &name, self.max_files) {
                Ok(appender) => Some(appender),
                Err(e) => {
                    // Logging through tracing here would re-enter this layer.
                    eprintln!("Warning: cannot open log file for task {task}: {e}");
                    None
                }
            }
        });
        if let Some(appender) = slot {
            let _ = appender.write_all(line.as_bytes());
        }
    }
}

impl<S> Layer<S> for TaskFileLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        if let (Some(task), Some(span)) = (visitor.task, ctx.span(id)) {
            span.extensions_mut().insert(TaskName(task));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let task = visitor.task.take().or_else(|| {
            ctx.event_scope(event)?
                .find_map(|span| span.extensions().get::<TaskName>().map(|t| t.0.clone()))
        });
        let Some(task) = task else {
            return;
        };

        let mut line = format!(
            "{} {:>5} {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event.metadata().level(),
            visitor.message.unwrap_or_default()
        );
        for (name, value) in &visitor.fields {
            line.push_str(&format!(" {name}={value}"));
        }
        line.push('\n');
        self.write_line(&task, &line);
    }
}

/// Task names are free-form; keep the path to a single safe component.
fn file_stem(task: &str) -> String {
    let stem: String = task
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match stem.trim_start_matches('.') {
        "" => "_".to_string(),
        trimmed => trimmed.to_string(),
    }
}
