use std::sync::Arc;

use taskops_core::Task;
use tracing::warn;

use crate::store::RunStore;

/// Presence-only dependency check.
///
/// A dependency is met once the store holds any `last_run` for it, whatever
/// that run's status or age.
#[derive(Clone)]
pub struct DependencyGate {
    store: Arc<dyn RunStore>,
}

impl DependencyGate {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self { store }
    }

    pub fn is_satisfied(&self, task: &Task) -> bool {
        self.missing(task).is_empty()
    }

    /// Dependencies of `task` that have never run, in name order.
    ///
    /// A store read error counts as "not run yet" for that dependency.
    pub fn missing(&self, task: &Task) -> Vec<String> {
        task.dependencies
            .iter()
            .filter(|dep| match self.store.last_run(dep) {
                Ok(last_run) => last_run.is_none(),
                Err(e) => {
                    warn!(task = %task.name, dependency = %dep, "dependency lookup failed: {e}");
                    true
                }
            })
            .cloned()
            .collect()
    }
}
