//! Global ordering lock
//!
//! Serializes every corrective write of the persistent-state family across
//! the process. It is always taken before the directory cache lock.

use parking_lot::{Mutex, MutexGuard};
use tracing::trace;

/// Process-wide lock ordering persistent-state writers
#[derive(Debug, Default)]
pub struct OrderedWriteLock {
    inner: Mutex<()>,
}

/// Held ordering lock, released on drop
#[must_use = "the ordering lock is released as soon as the guard is dropped"]
pub struct OrderedWriteGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl OrderedWriteLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the ordering lock is held
    pub fn acquire(&self) -> OrderedWriteGuard<'_> {
        let guard = self.inner.lock();
        trace!("ordering lock acquired");
        OrderedWriteGuard { _guard: guard }
    }

    /// Take the ordering lock only if it is free
    pub fn try_acquire(&self) -> Option<OrderedWriteGuard<'_>> {
        self.inner
            .try_lock()
            .map(|guard| OrderedWriteGuard { _guard: guard })
    }

    /// Whether some writer currently holds the lock
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}
