//! Run-state persistence capability.
//!
//! The engine only ever reads `last_run` / `last_status` and writes both
//! together through [`RunStore::record_completion`]. Implementations must
//! publish the pair atomically: a reader never sees a new `last_run` with an
//! old `last_status` or the reverse.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use taskops_core::TaskStatus;

use crate::error::Result;

pub trait RunStore: Send + Sync {
    fn last_run(&self, name: &str) -> Result<Option<DateTime<Utc>>>;

    fn last_status(&self, name: &str) -> Result<Option<TaskStatus>>;

    /// Both halves of the run-state in one consistent read.
    fn last_completion(&self, name: &str) -> Result<Option<(DateTime<Utc>, TaskStatus)>>;

    fn record_completion(&self, name: &str, at: DateTime<Utc>, status: TaskStatus) -> Result<()>;

    /// Called once by `ScheduleEngine::start`; an error here is fatal.
    fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    entries: DashMap<String, (DateTime<Utc>, TaskStatus)>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunStore for MemoryRunStore {
    fn last_run(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.entries.get(name).map(|e| e.value().0))
    }

    fn last_status(&self, name: &str) -> Result<Option<TaskStatus>> {
        Ok(self.entries.get(name).map(|e| e.value().1))
    }

    fn last_completion(&self, name: &str) -> Result<Option<(DateTime<Utc>, TaskStatus)>> {
        Ok(self.entries.get(name).map(|e| *e.value()))
    }

    fn record_completion(&self, name: &str, at: DateTime<Utc>, status: TaskStatus) -> Result<()> {
        self.entries.insert(name.to_string(), (at, status));
        Ok(())
    }
}
