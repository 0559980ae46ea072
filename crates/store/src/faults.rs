//! Fault injection for the in-memory store.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use rand::Rng;

use crate::{Result, StoreError};

#[derive(Debug, Default)]
struct FaultState {
    unreachable: bool,
    replicas_down: BTreeSet<usize>,
    reject_next_writes: usize,
    rejected_views: HashSet<String>,
    drop_probability: f64,
}

/// Shared, cloneable switchboard of injected failures.
///
/// Every clone controls the same state, so a test can keep one handle and give
/// another to the store.
#[derive(Debug, Clone, Default)]
pub struct FaultInjector {
    state: Arc<Mutex<FaultState>>,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FaultState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes every operation time out.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Marks a replica as down or back up.
    pub fn set_replica_down(&self, replica: usize, down: bool) {
        let mut state = self.lock();
        if down {
            state.replicas_down.insert(replica);
        } else {
            state.replicas_down.remove(&replica);
        }
    }

    /// Rejects the next `count` writes, whatever view they target.
    pub fn reject_next_writes(&self, count: usize) {
        self.lock().reject_next_writes = count;
    }

    /// Rejects every write to the named view until cleared.
    pub fn reject_view(&self, view: impl Into<String>) {
        self.lock().rejected_views.insert(view.into());
    }

    /// Drops writes at random with the given probability.
    pub fn set_drop_probability(&self, probability: f64) {
        self.lock().drop_probability = probability.clamp(0.0, 1.0);
    }

    /// Clears every injected fault.
    pub fn clear(&self) {
        *self.lock() = FaultState::default();
    }

    /// Returns true if the replica is currently down.
    pub fn is_down(&self, replica: usize) -> bool {
        self.lock().replicas_down.contains(&replica)
    }

    /// Checks that enough replicas are reachable for any operation.
    pub fn check_available(
        &self,
        operation: &'static str,
        required: usize,
        replicas: usize,
    ) -> Result<()> {
        let state = self.lock();
        if state.unreachable {
            return Err(StoreError::Timeout { operation });
        }
        let alive = (0..replicas)
            .filter(|r| !state.replicas_down.contains(r))
            .count();
        if alive < required {
            return Err(StoreError::Unavailable { required, alive });
        }
        Ok(())
    }

    /// Decides whether a write to `view` is accepted.
    pub fn check_write(&self, view: &str) -> Result<()> {
        let mut state = self.lock();
        let rejected = if state.reject_next_writes > 0 {
            state.reject_next_writes -= 1;
            true
        } else if state.rejected_views.contains(view) {
            true
        } else {
            state.drop_probability > 0.0
                && rand::thread_rng().gen_bool(state.drop_probability)
        };

        if rejected {
            tracing::debug!(view, "injected write rejection");
            return Err(StoreError::WriteRejected {
                view: view.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_next_writes_counts_down() {
        let faults = FaultInjector::new();
        faults.reject_next_writes(2);
        assert!(faults.check_write("a").is_err());
        assert!(faults.check_write("b").is_err());
        assert!(faults.check_write("c").is_ok());
    }

    #[test]
    fn rejected_view_only_affects_that_view() {
        let faults = FaultInjector::new();
        faults.reject_view("posts_by_category");
        assert!(faults.check_write("posts_by_category").is_err());
        assert!(faults.check_write("posts_by_author").is_ok());
        faults.clear();
        assert!(faults.check_write("posts_by_category").is_ok());
    }

    #[test]
    fn down_replicas_reduce_availability() {
        let faults = FaultInjector::new();
        faults.set_replica_down(0, true);
        faults.set_replica_down(1, true);
        assert!(faults.check_available("put", 1, 3).is_ok());
        let err = faults.check_available("put", 2, 3).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Unavailable {
                required: 2,
                alive: 1
            }
        ));
    }

    #[test]
    fn unreachable_times_out() {
        let faults = FaultInjector::new();
        faults.set_unreachable(true);
        let err = faults.check_available("get", 1, 3).unwrap_err();
        assert!(err.is_connectivity());
    }

    #[test]
    fn certain_drop_always_rejects() {
        let faults = FaultInjector::new();
        faults.set_drop_probability(1.0);
        assert!(faults.check_write("any").is_err());
        faults.set_drop_probability(0.0);
        assert!(faults.check_write("any").is_ok());
    }
}
