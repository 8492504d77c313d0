use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use taskops_core::{Schedule, Task, TaskopsError};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    clock::{Clock, SystemClock},
    coordinator::{ExecutionCoordinator, RunReport},
    error::{Result, SchedulerError},
    registry::{TaskRegistry, TaskSnapshot, Ticket},
    runner::Runner,
    store::RunStore,
};

pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// One slot in the fire queue. Ordered by fire time, then registration order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct FireEntry {
    at: DateTime<Utc>,
    seq: u64,
    name: String,
    generation: u64,
}

/// A finished worker. `report` is `None` if the run panicked.
struct Completion {
    task: Arc<Task>,
    generation: u64,
    report: Option<RunReport>,
}

/// Owns the fire queue and dispatches due tasks to the coordinator.
///
/// Fire times live in a min-heap keyed by `(fire_time, registration_seq)`.
/// Entries are never removed from the middle of the heap: unregistering a task
/// or re-registering a name bumps its generation in the registry, and stale
/// heap entries are discarded when popped.
///
/// Recurring tasks are fixed-delay: the next fire time is the completion
/// time of the previous trigger plus the interval.
pub struct ScheduleEngine {
    registry: Arc<TaskRegistry>,
    coordinator: Arc<ExecutionCoordinator>,
    store: Arc<dyn RunStore>,
    clock: Arc<dyn Clock>,
    queue: Mutex<BinaryHeap<Reverse<FireEntry>>>,
    tick: Duration,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl ScheduleEngine {
    /// Engine on the wall clock with a one-second tick.
    pub fn new(runner: Arc<dyn Runner>, store: Arc<dyn RunStore>) -> Self {
        Self::with_clock(runner, store, Arc::new(SystemClock), DEFAULT_TICK)
    }

    pub fn with_clock(
        runner: Arc<dyn Runner>,
        store: Arc<dyn RunStore>,
        clock: Arc<dyn Clock>,
        tick: Duration,
    ) -> Self {
        let registry = Arc::new(TaskRegistry::new());
        let coordinator = Arc::new(ExecutionCoordinator::new(
            runner,
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&clock),
        ));
        let (shutdown, _) = watch::channel(false);
        Self {
            registry,
            coordinator,
            store,
            clock,
            queue: Mutex::new(BinaryHeap::new()),
            // tokio::time::interval panics on a zero period.
            tick: tick.max(Duration::from_millis(1)),
            running: AtomicBool::new(false),
            shutdown,
        }
    }

    pub fn coordinator(&self) -> &Arc<ExecutionCoordinator> {
        &self.coordinator
    }

    /// Add `task` to the active schedule.
    ///
    /// The first fire is `now + interval` for recurring tasks and `start_time`
    /// for one-time tasks. `last_run` / `last_status` are seeded from the store.
    ///
    /// # Errors
    ///
    /// - `Definition`: the task fails structural validation.
    /// - `StartTimeInPast`: a one-time task whose start has passed.
    /// - `DuplicateTask`: the name is already in the active set.
    #[instrument(skip_all, fields(task = %task.name))]
    pub fn register(&self, task: Task) -> Result<()> {
        task.check()?;
        let now = self.clock.now();
        let first_fire = match &task.schedule {
            Schedule::Recurring { interval } => {
                after(now, *interval).ok_or_else(|| unrepresentable(&task.name))?
            }
            Schedule::OneTime { start_time } => {
                let start_time = *start_time;
                if start_time < now {
                    return Err(SchedulerError::StartTimeInPast {
                        name: task.name,
                        start_time,
                    });
                }
                start_time
            }
        };

        let seed = match self.store.last_completion(&task.name) {
            Ok(seed) => seed,
            Err(e) => {
                warn!("could not read previous run-state: {e}");
                None
            }
        };

        let name = task.name.clone();
        let ticket = self.registry.insert(task, first_fire, seed)?;
        self.push(first_fire, ticket, name);
        info!(next_fire = %first_fire, "task registered");
        Ok(())
    }

    /// Remove `name` from the active schedule.
    ///
    /// A trigger already in flight runs to completion but is not rescheduled.
    pub fn unregister(&self, name: &str) -> Result<()> {
        self.registry.remove(name)?;
        info!(task = %name, "task unregistered");
        Ok(())
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    pub fn task(&self, name: &str) -> Option<TaskSnapshot> {
        self.registry.get(name)
    }

    /// Every active task in registration order.
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        self.registry.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the tick loop until [`stop`](Self::stop) is called.
    ///
    /// Each due task runs on its own spawned worker. After `stop` no new
    /// trigger is dispatched; this future resolves once every in-flight
    /// worker has finished. A `stop` issued before `start` makes the next
    /// `start` return at once.
    ///
    /// # Errors
    ///
    /// - the store's health check fails (nothing is dispatched).
    /// - `AlreadyRunning` if another `start` is active.
    pub async fn start(&self) -> Result<()> {
        self.store.health_check()?;
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        let _running = RunningFlag(&self.running);

        let mut shutdown = self.shutdown.subscribe();
        let stopped_early = *shutdown.borrow_and_update();
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut workers: JoinSet<Completion> = JoinSet::new();

        info!(
            tick_ms = self.tick.as_millis() as u64,
            tasks = self.registry.len(),
            "schedule engine started"
        );

        while !stopped_early {
            tokio::select! {
                _ = ticker.tick() => self.dispatch_due(&mut workers),
                Some(joined) = workers.join_next(), if !workers.is_empty() => match joined {
                    Ok(done) => self.complete(done),
                    Err(e) => error!("scheduler worker failed: {e}"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        // Consumed: the next start() begins unstopped.
        self.shutdown.send_replace(false);

        if !workers.is_empty() {
            info!(in_flight = workers.len(), "waiting for in-flight runs");
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("scheduler worker failed: {e}");
            }
        }
        info!("schedule engine stopped");
        Ok(())
    }

    /// Halt future dispatch and clear the pending schedule.
    ///
    /// In-flight triggers, including their retry sleeps, are left to finish.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
        let cleared = {
            let mut queue = self.queue();
            let n = queue.len();
            queue.clear();
            n
        };
        self.registry.clear();
        info!(cleared, "schedule engine stop requested");
    }

    // --- private helpers ---------------------------------------------------

    fn queue(&self) -> MutexGuard<'_, BinaryHeap<Reverse<FireEntry>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, at: DateTime<Utc>, ticket: Ticket, name: String) {
        self.queue().push(Reverse(FireEntry {
            at,
            seq: ticket.seq,
            name,
            generation: ticket.generation,
        }));
    }

    fn pop_due(&self, now: DateTime<Utc>) -> Vec<FireEntry> {
        let mut queue = self.queue();
        let mut due = Vec::new();
        while queue.peek().is_some_and(|Reverse(e)| e.at <= now) {
            if let Some(Reverse(entry)) = queue.pop() {
                due.push(entry);
            }
        }
        due
    }

    fn dispatch_due(&self, workers: &mut JoinSet<Completion>) {
        let now = self.clock.now();
        for entry in self.pop_due(now) {
            let Some(task) = self.registry.dispatch(&entry.name, entry.generation) else {
                debug!(task = %entry.name, "discarding stale queue entry");
                continue;
            };
            debug!(task = %task.name, scheduled_for = %entry.at, "dispatching");

            let coordinator = Arc::clone(&self.coordinator);
            let generation = entry.generation;
            workers.spawn(async move {
                let run_task = Arc::clone(&task);
                // Inner spawn so a panicking runner still yields a completion.
                let run = tokio::spawn(async move {
                    coordinator.run_trigger(&run_task, Some(generation)).await
                });
                let report = match run.await {
                    Ok(report) => Some(report),
                    Err(e) => {
                        error!(task = %task.name, "run aborted: {e}");
                        None
                    }
                };
                Completion {
                    task,
                    generation,
                    report,
                }
            });
        }
    }

    /// `Dispatched -> Pending(next)` for recurring tasks, `Dispatched -> Retired`
    /// for one-time tasks.
    fn complete(&self, done: Completion) {
        let Completion {
            task,
            generation,
            report,
        } = done;

        match task.schedule {
            Schedule::Recurring { interval } => {
                let base = match report {
                    Some(RunReport::Finished { completed_at, .. }) => completed_at,
                    _ => self.clock.now(),
                };
                let Some(next) = after(base, interval) else {
                    error!(task = %task.name, "next fire time is out of range, retiring task");
                    self.registry.retire(&task.name, generation);
                    return;
                };
                if let Some(ticket) = self.registry.reschedule(&task.name, generation, next) {
                    self.push(next, ticket, task.name.clone());
                    debug!(task = %task.name, next_fire = %next, "rescheduled");
                }
            }
            Schedule::OneTime { .. } => {
                if self.registry.retire(&task.name, generation) {
                    info!(task = %task.name, "one-time task retired");
                }
            }
        }
    }
}

/// Clears the running flag even if the `start` future is dropped.
struct RunningFlag<'a>(&'a AtomicBool);

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn after(at: DateTime<Utc>, interval: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(interval)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
}

fn unrepresentable(name: &str) -> SchedulerError {
    SchedulerError::Definition(TaskopsError::ConfigValidation {
        task: name.to_string(),
        reason: "interval is too large to schedule".to_string(),
    })
}
