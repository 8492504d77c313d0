#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use taskops_scheduler::{
    Clock, MemoryRunStore, MonotonicClock, RunOutcome, Runner, ScheduleEngine,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const TICK: Duration = Duration::from_millis(100);

/// One scripted runner response.
#[derive(Debug, Clone)]
pub struct Step {
    pub outcome: RunOutcome,
    pub takes: Duration,
    pub panics: bool,
}

impl Step {
    pub fn ok() -> Self {
        Self {
            outcome: RunOutcome::success(),
            takes: Duration::ZERO,
            panics: false,
        }
    }

    pub fn exit(code: i32) -> Self {
        Self {
            outcome: RunOutcome::exit(code),
            ..Self::ok()
        }
    }

    pub fn outcome(outcome: RunOutcome) -> Self {
        Self {
            outcome,
            ..Self::ok()
        }
    }

    pub fn panic() -> Self {
        Self {
            panics: true,
            ..Self::ok()
        }
    }

    pub fn taking(mut self, takes: Duration) -> Self {
        self.takes = takes;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub command: String,
    pub started: Instant,
    pub finished: Instant,
}

/// Runner fake: replays `script`, then `fallback` forever.
pub struct ScriptedRunner {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: Mutex<Vec<Call>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedRunner {
    pub fn new(fallback: Step) -> Arc<Self> {
        Self::scripted([], fallback)
    }

    pub fn scripted(script: impl IntoIterator<Item = Step>, fallback: Step) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            calls: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, command: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.command == command)
            .collect()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Runner for ScriptedRunner {
    async fn run(&self, command: &str, _timeout: Option<Duration>) -> RunOutcome {
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        let started = Instant::now();
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        tokio::time::sleep(step.takes).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(Call {
            command: command.to_string(),
            started,
            finished: Instant::now(),
        });

        if step.panics {
            panic!("scripted runner panic");
        }
        step.outcome
    }
}

pub struct Harness {
    pub engine: Arc<ScheduleEngine>,
    pub runner: Arc<ScriptedRunner>,
    pub store: Arc<MemoryRunStore>,
    pub clock: Arc<MonotonicClock>,
}

impl Harness {
    /// Must be called from inside a paused-time runtime.
    pub fn new(runner: Arc<ScriptedRunner>) -> Self {
        let store = Arc::new(MemoryRunStore::new());
        let clock = Arc::new(MonotonicClock::new());
        let engine = Arc::new(ScheduleEngine::with_clock(
            runner.clone(),
            store.clone(),
            clock.clone(),
            TICK,
        ));
        Self {
            engine,
            runner,
            store,
            clock,
        }
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    pub fn spawn(&self) -> JoinHandle<taskops_scheduler::Result<()>> {
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move { engine.start().await })
    }
}

pub async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}
