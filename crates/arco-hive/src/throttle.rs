//! Process-local, per-table commit throttle.
//!
//! Commits on the same table within one process queue on a fair mutex before
//! they ever reach the external lock service. This only reduces lock-service
//! churn; cross-process exclusivity still comes from the external lock and the
//! CAS check.
//!
//! ## Eviction
//!
//! Entries idle for longer than the configured timeout are dropped on every
//! [`LocalCommitThrottle::acquire`] and on explicit
//! [`LocalCommitThrottle::evict_idle`] calls. An entry is never dropped while a
//! handle or a queued waiter still references its mutex: the reference is
//! cloned under the map's shard lock and eviction inspects the reference count
//! under the same lock, so two tasks can never end up holding different
//! mutexes for the same key.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

#[derive(Debug)]
struct LocalMutexEntry {
    mutex: Arc<Mutex<()>>,
    last_access: Instant,
}

impl LocalMutexEntry {
    fn new(now: Instant) -> Self {
        Self {
            mutex: Arc::new(Mutex::new(())),
            last_access: now,
        }
    }

    fn in_use(&self) -> bool {
        Arc::strong_count(&self.mutex) > 1
    }
}

/// Map from resource key to a fair (FIFO) async mutex.
#[derive(Debug)]
pub struct LocalCommitThrottle {
    entries: DashMap<String, LocalMutexEntry>,
    idle_timeout: Duration,
}

impl LocalCommitThrottle {
    /// Creates a throttle whose entries may be evicted after `idle_timeout`.
    #[must_use]
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            idle_timeout,
        }
    }

    /// Waits for exclusive local access to `key`.
    ///
    /// Waiters are served in arrival order. The returned handle releases the
    /// mutex when dropped. Dropping the returned future before it resolves
    /// gives up the place in the queue.
    pub async fn acquire(&self, key: &str) -> ScopedMutexHandle {
        self.evict_idle();

        let mutex = {
            let now = Instant::now();
            let mut entry = self
                .entries
                .entry(key.to_string())
                .or_insert_with(|| LocalMutexEntry::new(now));
            entry.last_access = now;
            Arc::clone(&entry.mutex)
        };

        let guard = mutex.lock_owned().await;
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.last_access = Instant::now();
        }
        tracing::trace!(key, "local commit mutex acquired");

        ScopedMutexHandle {
            key: key.to_string(),
            _guard: guard,
        }
    }

    /// Removes entries idle past the timeout that nobody holds or waits on.
    ///
    /// Returns the number of entries removed.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            entry.in_use() || now.duration_since(entry.last_access) <= self.idle_timeout
        });
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            tracing::debug!(evicted, "evicted idle local commit mutexes");
        }
        evicted
    }

    /// Returns `true` when `key` currently has an entry.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured idle timeout.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }
}

/// Exclusive local access to one resource key; released on drop.
#[derive(Debug)]
#[must_use = "the local mutex is released as soon as the handle is dropped"]
pub struct ScopedMutexHandle {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl ScopedMutexHandle {
    /// The resource key this handle guards.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}
