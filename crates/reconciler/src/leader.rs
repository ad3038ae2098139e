//! Leader election as seen by the reconciler.
//!
//! The reconciler only polls for leadership and listens for lease
//! acquisitions; running the election is someone else's job.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

/// Callback fired whenever the leader lease is acquired.
pub type LeaseCallback = Arc<dyn Fn() + Send + Sync>;

/// Point-in-time leadership queries and lease acquisition notifications.
pub trait LeaderElector: Send + Sync {
    /// Whether this instance currently holds the lease.
    fn is_leader(&self) -> bool;

    /// Register `callback` to be fired on every lease acquisition.
    ///
    /// Callbacks may fire any number of times, from any thread, and are not
    /// ordered relative to other events. They must not block.
    fn add_acquired_lease_callback(&self, callback: LeaseCallback);
}

/// Elector for single-controller setups: always the leader, never notifies.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysLeader;

impl LeaderElector for AlwaysLeader {
    fn is_leader(&self) -> bool {
        true
    }

    fn add_acquired_lease_callback(&self, _callback: LeaseCallback) {}
}

/// In-process elector whose lease is toggled by the host.
#[derive(Default)]
pub struct LeaseFlag {
    leader: AtomicBool,
    callbacks: Mutex<Vec<LeaseCallback>>,
}

impl LeaseFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease. Fires the registered callbacks if it wasn't held.
    pub fn acquire(&self) {
        if self.leader.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("Leader lease acquired");

        // Fire outside the lock so callbacks may register further callbacks.
        let callbacks = self.callbacks.lock().clone();
        for callback in callbacks {
            callback();
        }
    }

    /// Give up the lease.
    pub fn release(&self) {
        if self.leader.swap(false, Ordering::AcqRel) {
            debug!("Leader lease released");
        }
    }
}

impl LeaderElector for LeaseFlag {
    fn is_leader(&self) -> bool {
        self.leader.load(Ordering::Acquire)
    }

    fn add_acquired_lease_callback(&self, callback: LeaseCallback) {
        self.callbacks.lock().push(callback);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counting(counter: &Arc<AtomicUsize>) -> LeaseCallback {
        let counter = Arc::clone(counter);
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_always_leader() {
        assert!(AlwaysLeader.is_leader());
    }

    #[test]
    fn test_lease_flag_fires_on_transition_only() {
        let flag = LeaseFlag::new();
        let fired = Arc::new(AtomicUsize::new(0));
        flag.add_acquired_lease_callback(counting(&fired));
        flag.add_acquired_lease_callback(counting(&fired));

        assert!(!flag.is_leader());

        flag.acquire();
        assert!(flag.is_leader());
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        // Already held, nothing to announce.
        flag.acquire();
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        flag.release();
        assert!(!flag.is_leader());
        flag.acquire();
        assert_eq!(fired.load(Ordering::SeqCst), 4);
    }
}
