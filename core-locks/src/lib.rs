//! # Resource Lock Manager
//!
//! Provides exactly one mutual-exclusion lock per repository ID, created on
//! demand.
//!
//! ## Overview
//!
//! Sync operations for one repository must never run concurrently. The
//! [`LockManager`] hands out `Arc<tokio::sync::Mutex<()>>` handles keyed by
//! repository ID; all callers asking for the same ID receive the same lock
//! object, including callers racing on the first request for an unseen ID.
//!
//! Callers acquire via `lock_owned()` so release is tied to guard drop and
//! happens on every exit path, including panic unwind. There is no manual
//! unlock anywhere.
//!
//! The map is bounded: beyond `capacity` entries, the least-recently-used
//! *idle* lock is evicted. A lock that is held or waited on is never evicted
//! (anyone holding or waiting holds a clone of the `Arc`, which is visible in
//! its strong count), so eviction can never produce two live locks for one
//! repository.
//!
//! Locks are not re-entrant: a holder that re-acquires its own lock on the
//! same execution path deadlocks. Callers must also never hold two different
//! repository locks at once; no global acquisition order is imposed.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::trace;

/// A handle to one repository's exclusive lock.
pub type ResourceLock = Arc<Mutex<()>>;

/// Lazily-created, bounded map of per-repository locks.
pub struct LockManager {
    locks: Mutex<LruCache<String, ResourceLock>>,
    capacity: NonZeroUsize,
}

impl LockManager {
    /// Creates a lock manager bounded at `capacity` distinct repositories.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self {
            // Unbounded underneath; the idle-only eviction policy in
            // `lock_for` enforces the capacity instead of LruCache itself,
            // which would evict held entries.
            locks: Mutex::new(LruCache::unbounded()),
            capacity: NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
        }
    }

    /// Returns the lock for `repo_id`, creating it on first use.
    ///
    /// Get-or-create is atomic with respect to the key: the whole map is
    /// guarded by one mutex, so concurrent first-callers for the same unseen
    /// ID receive clones of a single lock, never two distinct locks.
    pub async fn lock_for(&self, repo_id: &str) -> ResourceLock {
        let mut locks = self.locks.lock().await;

        if let Some(existing) = locks.get(repo_id) {
            return Arc::clone(existing);
        }

        if locks.len() >= self.capacity.get() {
            Self::evict_idle(&mut locks);
        }

        let lock: ResourceLock = Arc::new(Mutex::new(()));
        locks.put(repo_id.to_string(), Arc::clone(&lock));
        trace!(repo_id, "created resource lock");
        lock
    }

    /// Evicts the least-recently-used idle entry, if any.
    ///
    /// An entry is idle when the map holds the only reference to it: no guard
    /// is alive and nobody is waiting. If every entry is busy the map is
    /// allowed to exceed its capacity; evicting a busy lock would let a
    /// second lock be created for a repository whose first lock is still
    /// held.
    fn evict_idle(locks: &mut LruCache<String, ResourceLock>) {
        let victim = locks
            .iter()
            .rev() // least-recently-used first
            .find(|(_, lock)| Arc::strong_count(lock) == 1)
            .map(|(repo_id, _)| repo_id.clone());

        if let Some(repo_id) = victim {
            locks.pop(&repo_id);
            trace!(repo_id, "evicted idle resource lock");
        }
    }

    /// Number of locks currently materialized.
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Whether no locks are materialized.
    pub async fn is_empty(&self) -> bool {
        self.locks.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn test_same_id_returns_same_lock() {
        let manager = LockManager::new(8);

        let a = manager.lock_for("repo-1").await;
        let b = manager.lock_for("repo-1").await;

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn test_different_ids_get_distinct_locks() {
        let manager = LockManager::new(8);

        let a = manager.lock_for("repo-1").await;
        let b = manager.lock_for("repo-2").await;

        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_concurrent_first_callers_share_one_lock() {
        let manager = Arc::new(LockManager::new(8));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(
                async move { manager.lock_for("repo-1").await },
            ));
        }

        let mut locks = Vec::new();
        for handle in handles {
            locks.push(handle.await.unwrap());
        }

        for lock in &locks[1..] {
            assert!(Arc::ptr_eq(&locks[0], lock));
        }
    }

    #[tokio::test]
    async fn test_mutual_exclusion_across_handles() {
        let manager = Arc::new(LockManager::new(8));
        let in_critical = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = Arc::clone(&manager);
            let in_critical = Arc::clone(&in_critical);
            let max_seen = Arc::clone(&max_seen);

            handles.push(tokio::spawn(async move {
                let lock = manager.lock_for("repo-1").await;
                let _guard = lock.lock_owned().await;

                let now = in_critical.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(5)).await;
                in_critical.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_idle_locks_evicted_at_capacity() {
        let manager = LockManager::new(2);

        manager.lock_for("repo-1").await;
        manager.lock_for("repo-2").await;
        manager.lock_for("repo-3").await;

        assert_eq!(manager.len().await, 2);

        // repo-1 was least recently used and idle, so it was the victim; a
        // fresh handle for it is a new lock object.
        let again = manager.lock_for("repo-1").await;
        assert_eq!(Arc::strong_count(&again), 2); // map + local handle
    }

    #[tokio::test]
    async fn test_held_lock_never_evicted() {
        let manager = LockManager::new(1);

        let held = manager.lock_for("repo-1").await;
        let _guard = held.clone().lock_owned().await;

        // Filling past capacity cannot displace the held lock.
        manager.lock_for("repo-2").await;
        manager.lock_for("repo-3").await;

        let same = manager.lock_for("repo-1").await;
        assert!(Arc::ptr_eq(&held, &same));
    }

    #[tokio::test]
    async fn test_release_makes_lock_acquirable_again() {
        let manager = LockManager::new(8);
        let lock = manager.lock_for("repo-1").await;

        {
            let _guard = lock.clone().lock_owned().await;
            assert!(lock.try_lock().is_err());
        }

        assert!(lock.try_lock().is_ok());
    }
}
