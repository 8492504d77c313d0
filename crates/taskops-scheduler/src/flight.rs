//! Per-task single-flight guard.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct SingleFlight {
    running: Mutex<HashSet<String>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim `name`. `None` if a flight for it is already held.
    pub fn try_acquire(&self, name: &str) -> Option<FlightGuard<'_>> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if !running.insert(name.to_string()) {
            return None;
        }
        Some(FlightGuard {
            flights: self,
            name: name.to_string(),
        })
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }
}

/// Releases the claim on drop, including during unwinding.
#[derive(Debug)]
pub struct FlightGuard<'a> {
    flights: &'a SingleFlight,
    name: String,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flights
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_fails_until_release() {
        let flights = SingleFlight::new();
        let guard = flights.try_acquire("a").unwrap();
        assert!(flights.try_acquire("a").is_none());
        assert!(flights.try_acquire("b").is_some());
        assert!(flights.is_running("a"));

        drop(guard);
        assert!(!flights.is_running("a"));
        assert!(flights.try_acquire("a").is_some());
    }

    #[test]
    fn released_on_panic() {
        let flights = SingleFlight::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = flights.try_acquire("boom").unwrap();
            panic!("runner blew up");
        }));
        assert!(result.is_err());
        assert!(!flights.is_running("boom"));
    }
}
