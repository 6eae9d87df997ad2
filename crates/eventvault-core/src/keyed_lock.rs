//! Per-key async mutual exclusion
//!
//! [`KeyedLocks`] hands out one async mutex per key. Entries exist only
//! while some task holds or awaits the key's lock, so the map is bounded by
//! in-flight work rather than by the number of keys ever seen.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Map of lazily created, reference-counted per-key mutexes
#[derive(Debug)]
pub struct KeyedLocks<K: Eq + Hash + Clone> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Acquire the lock for `key`, waiting for any current holder
    ///
    /// Cancel safe: dropping the returned future before it completes
    /// leaves no entry behind.
    pub async fn lock(&self, key: &K) -> KeyedLockGuard<'_, K> {
        let release = Release {
            locks: &self.locks,
            key: key.clone(),
        };
        let mutex = {
            let entry = self.locks.entry(key.clone()).or_default();
            Arc::clone(entry.value())
        };
        let guard = mutex.lock_owned().await;
        KeyedLockGuard {
            _guard: guard,
            _release: release,
        }
    }

    /// Number of keys currently held or awaited
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Holds a key's lock until dropped
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct KeyedLockGuard<'a, K: Eq + Hash + Clone> {
    // Field order matters: the mutex guard (and its Arc) must drop before
    // the release check counts references.
    _guard: OwnedMutexGuard<()>,
    _release: Release<'a, K>,
}

struct Release<'a, K: Eq + Hash + Clone> {
    locks: &'a DashMap<K, Arc<Mutex<()>>>,
    key: K,
}

impl<K: Eq + Hash + Clone> Drop for Release<'_, K> {
    fn drop(&mut self) {
        // Only the map's own reference left: nobody holds or awaits the key.
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_removed_after_release() {
        let locks = KeyedLocks::new();
        {
            let _guard = locks.lock(&"a").await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let active = active.clone();
            let max_active = max_active.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(&42u32).await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_active.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.lock(&1u32).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(&2u32)).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_entry_kept_while_waiter_pending() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.lock(&"k").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&"k").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        // The waiter still references the mutex, so the entry survives
        // until it finishes.
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_waiter_leaves_no_entry() {
        let locks = KeyedLocks::new();
        let guard = locks.lock(&"k").await;

        let attempt = tokio::time::timeout(Duration::from_millis(20), locks.lock(&"k")).await;
        assert!(attempt.is_err());

        drop(guard);
        assert!(locks.is_empty());
    }
}
