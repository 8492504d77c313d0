//! Active task set and per-task run-state.
//!
//! Entries are keyed by task name. Each registration gets a fresh
//! `generation`, so fire-queue entries and completions that belong to an
//! earlier registration of the same name can be recognised and ignored.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use taskops_core::{Task, TaskStatus};

use crate::error::{Result, SchedulerError};

/// Where a registered task sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting in the fire queue.
    Pending,
    /// Handed to the coordinator; not in the fire queue.
    Dispatched,
}

/// Point-in-time view of one registered task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSnapshot {
    pub name: String,
    pub state: TaskState,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub last_status: Option<TaskStatus>,
    pub attempts_used_this_cycle: u32,
}

/// Identifies the fire-queue slot of a specific registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub seq: u64,
    pub generation: u64,
}

struct Entry {
    task: Arc<Task>,
    ticket: Ticket,
    state: TaskState,
    next_fire: Option<DateTime<Utc>>,
    last_run: Option<DateTime<Utc>>,
    last_status: Option<TaskStatus>,
    attempts: u32,
}

impl Entry {
    fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            name: self.task.name.clone(),
            state: self.state,
            next_fire_time: self.next_fire,
            last_run: self.last_run,
            last_status: self.last_status,
            attempts_used_this_cycle: self.attempts,
        }
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    next_seq: u64,
    next_generation: u64,
}

#[derive(Default)]
pub struct TaskRegistry {
    inner: Mutex<Inner>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `task` as `Pending(next_fire)`, seeding its run-state from `seed`.
    pub fn insert(
        &self,
        task: Task,
        next_fire: DateTime<Utc>,
        seed: Option<(DateTime<Utc>, TaskStatus)>,
    ) -> Result<Ticket> {
        let mut inner = self.lock();
        if inner.entries.contains_key(&task.name) {
            return Err(SchedulerError::DuplicateTask { name: task.name });
        }
        let ticket = Ticket {
            seq: inner.next_seq,
            generation: inner.next_generation,
        };
        inner.next_seq += 1;
        inner.next_generation += 1;

        let entry = Entry {
            task: Arc::new(task),
            ticket,
            state: TaskState::Pending,
            next_fire: Some(next_fire),
            last_run: seed.map(|(at, _)| at),
            last_status: seed.map(|(_, status)| status),
            attempts: 0,
        };
        inner.entries.insert(entry.task.name.clone(), entry);
        Ok(ticket)
    }

    pub fn remove(&self, name: &str) -> Result<Arc<Task>> {
        self.lock()
            .entries
            .remove(name)
            .map(|e| e.task)
            .ok_or_else(|| SchedulerError::TaskNotFound {
                name: name.to_string(),
            })
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Pending -> Dispatched` for the registration identified by `generation`.
    ///
    /// Returns `None` when the entry is gone, was re-registered, or is not
    /// pending; the caller treats that as a stale queue entry.
    pub fn dispatch(&self, name: &str, generation: u64) -> Option<Arc<Task>> {
        let mut inner = self.lock();
        let entry = inner.entries.get_mut(name)?;
        if entry.ticket.generation != generation || entry.state != TaskState::Pending {
            return None;
        }
        entry.state = TaskState::Dispatched;
        entry.next_fire = None;
        Some(Arc::clone(&entry.task))
    }

    /// `Dispatched -> Pending(next_fire)`. `None` if the registration is gone.
    pub fn reschedule(&self, name: &str, generation: u64, next_fire: DateTime<Utc>) -> Option<Ticket> {
        let mut inner = self.lock();
        let entry = inner.entries.get_mut(name)?;
        if entry.ticket.generation != generation {
            return None;
        }
        entry.state = TaskState::Pending;
        entry.next_fire = Some(next_fire);
        Some(entry.ticket)
    }

    /// Remove a one-time task after its trigger. Stale generations are ignored.
    pub fn retire(&self, name: &str, generation: u64) -> bool {
        let mut inner = self.lock();
        let current = inner
            .entries
            .get(name)
            .is_some_and(|e| e.ticket.generation == generation);
        if current {
            inner.entries.remove(name);
        }
        current
    }

    /// Generation of the current registration of `name`.
    pub fn generation(&self, name: &str) -> Option<u64> {
        self.lock().entries.get(name).map(|e| e.ticket.generation)
    }

    /// Run-state writes below only land on the registration they belong to.
    fn with_current(&self, name: &str, generation: u64, f: impl FnOnce(&mut Entry)) {
        if let Some(entry) = self
            .lock()
            .entries
            .get_mut(name)
            .filter(|e| e.ticket.generation == generation)
        {
            f(entry);
        }
    }

    /// Reset the attempt counter at the start of a trigger.
    pub fn begin_cycle(&self, name: &str, generation: u64) {
        self.with_current(name, generation, |e| e.attempts = 0);
    }

    pub fn record_attempt(&self, name: &str, generation: u64, attempt: u32) {
        self.with_current(name, generation, |e| e.attempts = attempt);
    }

    pub fn record_outcome(&self, name: &str, generation: u64, at: DateTime<Utc>, status: TaskStatus) {
        self.with_current(name, generation, |e| {
            e.last_run = Some(at);
            e.last_status = Some(status);
        });
    }

    pub fn get(&self, name: &str) -> Option<TaskSnapshot> {
        self.lock().entries.get(name).map(Entry::snapshot)
    }

    /// All entries in registration order.
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        let inner = self.lock();
        let mut entries: Vec<&Entry> = inner.entries.values().collect();
        entries.sort_by_key(|e| e.ticket.seq);
        entries.into_iter().map(Entry::snapshot).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn task(name: &str) -> Task {
        Task::recurring(name, "true", Duration::from_secs(60))
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let reg = TaskRegistry::new();
        let now = Utc::now();
        reg.insert(task("a"), now, None).unwrap();
        let err = reg.insert(task("a"), now, None).unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateTask { name } if name == "a"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn dispatch_requires_matching_generation() {
        let reg = TaskRegistry::new();
        let now = Utc::now();
        let first = reg.insert(task("a"), now, None).unwrap();
        reg.remove("a").unwrap();
        let second = reg.insert(task("a"), now, None).unwrap();

        assert_ne!(first.generation, second.generation);
        assert!(reg.dispatch("a", first.generation).is_none());
        assert!(reg.dispatch("a", second.generation).is_some());
        // Already dispatched.
        assert!(reg.dispatch("a", second.generation).is_none());
        assert_eq!(reg.get("a").unwrap().state, TaskState::Dispatched);
    }

    #[test]
    fn seeded_state_and_outcomes_show_in_snapshot() {
        let reg = TaskRegistry::new();
        let now = Utc::now();
        reg.insert(task("b"), now, Some((now, TaskStatus::Failed))).unwrap();
        let a = reg.insert(task("a"), now, None).unwrap();

        reg.begin_cycle("a", a.generation);
        reg.record_attempt("a", a.generation, 2);
        reg.record_outcome("a", a.generation, now, TaskStatus::Success);

        let snap = reg.snapshot();
        assert_eq!(snap[0].name, "b");
        assert_eq!(snap[0].last_status, Some(TaskStatus::Failed));
        assert_eq!(snap[1].name, "a");
        assert_eq!(snap[1].attempts_used_this_cycle, 2);
        assert_eq!(snap[1].last_run, Some(now));
    }

    #[test]
    fn retire_ignores_stale_generation() {
        let reg = TaskRegistry::new();
        let now = Utc::now();
        let t = reg.insert(task("once"), now, None).unwrap();
        assert!(!reg.retire("once", t.generation + 1));
        assert!(reg.retire("once", t.generation));
        assert!(!reg.contains("once"));
        assert!(matches!(
            reg.remove("once"),
            Err(SchedulerError::TaskNotFound { .. })
        ));
    }

    #[test]
    fn writes_from_an_earlier_registration_are_ignored() {
        let reg = TaskRegistry::new();
        let now = Utc::now();
        let old = reg.insert(task("a"), now, None).unwrap();
        reg.remove("a").unwrap();
        let new = reg.insert(task("a"), now, None).unwrap();
        assert_eq!(reg.generation("a"), Some(new.generation));

        reg.begin_cycle("a", old.generation);
        reg.record_attempt("a", old.generation, 3);
        reg.record_outcome("a", old.generation, now, TaskStatus::Failed);

        let snap = reg.get("a").unwrap();
        assert_eq!(snap.attempts_used_this_cycle, 0);
        assert_eq!(snap.last_run, None);
        assert_eq!(snap.last_status, None);

        reg.record_attempt("a", new.generation, 1);
        assert_eq!(reg.get("a").unwrap().attempts_used_this_cycle, 1);
    }
}
