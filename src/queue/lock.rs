//! TTL'd named locks for cooperative single-flight execution.
//!
//! The queue serializes itself across possibly-overlapping trigger
//! invocations with two named locks: one spanning a whole scheduler cycle,
//! one scoped to a single job body. Acquisition is non-blocking — a contended
//! lock means another invocation is active and the caller simply tries again
//! on its next trigger. The TTL is crash recovery: a holder that dies mid-job
//! stops blocking the system once its lease expires, trading strict mutual
//! exclusion for liveness.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A named-lock service with TTL leases.
///
/// Any backend with an atomic compare-and-swap can implement this; the
/// in-memory implementation below covers single-process deployments.
pub trait LockService: Send + Sync {
    /// Attempts to take the named lock for `ttl`. Never blocks.
    ///
    /// Returns false if another holder currently has an unexpired lease.
    fn try_acquire(&self, name: &str, ttl: Duration) -> bool;

    /// Releases the named lock. Releasing an expired or absent lock is a
    /// no-op.
    fn release(&self, name: &str);
}

/// In-memory lock service backed by a mutexed lease table.
#[derive(Debug, Default)]
pub struct MemoryLockService {
    leases: Mutex<HashMap<String, Instant>>,
}

impl MemoryLockService {
    /// Creates an empty lock service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockService for MemoryLockService {
    fn try_acquire(&self, name: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut leases = self.leases.lock();
        match leases.get(name) {
            Some(expiry) if *expiry > now => false,
            _ => {
                leases.insert(name.to_string(), now + ttl);
                true
            }
        }
    }

    fn release(&self, name: &str) {
        self.leases.lock().remove(name);
    }
}

/// RAII holder that releases its lock on drop.
///
/// Gives every exit path out of a scheduler cycle — early return, error
/// propagation, normal completion — the same release guarantee.
pub struct LockGuard<'a> {
    service: &'a dyn LockService,
    name: &'a str,
}

impl<'a> LockGuard<'a> {
    /// Attempts to acquire the named lock, returning a releasing guard.
    #[must_use]
    pub fn acquire(service: &'a dyn LockService, name: &'a str, ttl: Duration) -> Option<Self> {
        if service.try_acquire(name, ttl) {
            Some(Self { service, name })
        } else {
            None
        }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.service.release(self.name);
    }
}
