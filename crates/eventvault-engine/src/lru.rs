//! Fixed-capacity LRU cache with coalesced population
//!
//! Entries live in a dense slab threaded by an intrusive doubly linked list,
//! most recently used first. A hash index maps keys to slab slots, so every
//! operation is O(1). Removal swaps the last slab node into the freed slot,
//! keeping the slab dense without a free list.
//!
//! The list is guarded by one short-held mutex. Population on a miss is
//! guarded separately, per key, so concurrent misses on one key run the
//! factory once while unrelated keys proceed in parallel.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use eventvault_core::{KeyedLockGuard, KeyedLocks};
use parking_lot::Mutex;

/// Sentinel value for null pointers in the linked list.
const SENTINEL: usize = usize::MAX;

/// Called with each entry evicted by capacity or [`LruCache::drop_oldest`]
pub type EvictionListener<K, V> = Arc<dyn Fn(&K, &V) + Send + Sync>;

/// Counters describing cache behavior since creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LruStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    pub len: usize,
}

/// A slab node in the intrusive doubly-linked LRU list.
struct LruNode<K, V> {
    key: K,
    value: V,
    prev: usize,
    next: usize,
}

struct LruState<K, V> {
    index: HashMap<K, usize>,
    slab: Vec<LruNode<K, V>>,
    /// Most recently used
    head: usize,
    /// Least recently used
    tail: usize,
    stats: LruStats,
}

impl<K: Eq + Hash + Clone, V: Clone> LruState<K, V> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            slab: Vec::new(),
            head: SENTINEL,
            tail: SENTINEL,
            stats: LruStats::default(),
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    /// Look up and promote
    fn get(&mut self, key: &K) -> Option<V> {
        let slot = *self.index.get(key)?;
        self.move_to_head(slot);
        Some(self.slab[slot].value.clone())
    }

    /// Replace in place or insert at head, evicting the tail when full
    ///
    /// Returns the previous value and any evicted entry.
    fn upsert(&mut self, key: K, value: V, capacity: usize) -> (Option<V>, Option<(K, V)>) {
        if let Some(&slot) = self.index.get(&key) {
            let previous = std::mem::replace(&mut self.slab[slot].value, value);
            self.move_to_head(slot);
            return (Some(previous), None);
        }

        let evicted = if self.len() >= capacity && self.tail != SENTINEL {
            self.stats.evictions += 1;
            Some(self.remove_slot(self.tail))
        } else {
            None
        };

        let slot = self.slab.len();
        self.slab.push(LruNode {
            key: key.clone(),
            value,
            prev: SENTINEL,
            next: SENTINEL,
        });
        self.index.insert(key, slot);
        self.push_front(slot);
        self.stats.insertions += 1;

        (None, evicted)
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let slot = *self.index.get(key)?;
        Some(self.remove_slot(slot).1)
    }

    fn move_to_head(&mut self, slot: usize) {
        if self.head != slot {
            self.detach(slot);
            self.push_front(slot);
        }
    }

    /// Unlink a node and take it out of the slab
    fn remove_slot(&mut self, slot: usize) -> (K, V) {
        self.detach(slot);
        let node = self.slab.swap_remove(slot);
        self.index.remove(&node.key);

        // The former last node now lives at `slot`; repoint its neighbors.
        if slot < self.slab.len() {
            let (prev, next) = (self.slab[slot].prev, self.slab[slot].next);
            if prev == SENTINEL {
                self.head = slot;
            } else {
                self.slab[prev].next = slot;
            }
            if next == SENTINEL {
                self.tail = slot;
            } else {
                self.slab[next].prev = slot;
            }
            if let Some(index) = self.index.get_mut(&self.slab[slot].key) {
                *index = slot;
            }
        }

        (node.key, node.value)
    }

    /// Detach a node from the doubly-linked list.
    fn detach(&mut self, slot: usize) {
        let prev = self.slab[slot].prev;
        let next = self.slab[slot].next;

        if prev == SENTINEL {
            self.head = next;
        } else {
            self.slab[prev].next = next;
        }

        if next == SENTINEL {
            self.tail = prev;
        } else {
            self.slab[next].prev = prev;
        }

        self.slab[slot].prev = SENTINEL;
        self.slab[slot].next = SENTINEL;
    }

    /// Push a node to the front (most recently used).
    fn push_front(&mut self, slot: usize) {
        self.slab[slot].prev = SENTINEL;
        self.slab[slot].next = self.head;

        if self.head != SENTINEL {
            self.slab[self.head].prev = slot;
        }
        self.head = slot;

        if self.tail == SENTINEL {
            self.tail = slot;
        }
    }
}

/// Thread-safe LRU cache
pub struct LruCache<K: Eq + Hash + Clone, V> {
    state: Mutex<LruState<K, V>>,
    capacity: usize,
    populating: KeyedLocks<K>,
    on_evict: Option<EvictionListener<K, V>>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LruState::new()),
            capacity: capacity.max(1),
            populating: KeyedLocks::new(),
            on_evict: None,
        }
    }

    /// Notify `listener` of every evicted entry, outside the cache lock
    pub fn with_eviction_listener(mut self, listener: EvictionListener<K, V>) -> Self {
        self.on_evict = Some(listener);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up a key, promoting it to most-recently-used on hit.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.state.lock();
        let value = state.get(key);
        if value.is_some() {
            state.stats.hits += 1;
        } else {
            state.stats.misses += 1;
        }
        value
    }

    /// Look up a key without promoting it or touching the counters
    pub fn peek(&self, key: &K) -> Option<V> {
        let state = self.state.lock();
        state
            .index
            .get(key)
            .map(|&slot| state.slab[slot].value.clone())
    }

    /// Return the cached value, or populate it with `factory`
    ///
    /// Concurrent misses on the same key wait for the first caller and then
    /// observe its value; the factory runs once. A failed factory caches
    /// nothing and the next waiter tries again.
    pub async fn get_or_add<F, Fut, E>(&self, key: &K, factory: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let _populating = self.populating.lock(key).await;
        let existing = self.state.lock().get(key);
        if let Some(value) = existing {
            return Ok(value);
        }

        let value = factory().await?;
        let (_, evicted) = self
            .state
            .lock()
            .upsert(key.clone(), value.clone(), self.capacity);
        self.notify_evicted(evicted);
        Ok(value)
    }

    /// Block `get_or_add` misses on `key` until the guard drops
    ///
    /// Hits on a resident value are not affected.
    pub async fn hold_population(&self, key: &K) -> KeyedLockGuard<'_, K> {
        self.populating.lock(key).await
    }

    /// Insert or replace, promoting to most-recently-used
    ///
    /// Returns the replaced value, if any.
    pub fn add_or_update(&self, key: K, value: V) -> Option<V> {
        let (previous, evicted) = self.state.lock().upsert(key, value, self.capacity);
        self.notify_evicted(evicted);
        previous
    }

    /// Promote `key` only while its value satisfies `is_current`
    ///
    /// Never inserts. Returns false when the key is absent or holds some
    /// other value.
    pub fn touch_if(&self, key: &K, is_current: impl FnOnce(&V) -> bool) -> bool {
        let mut state = self.state.lock();
        let Some(&slot) = state.index.get(key) else {
            return false;
        };
        if !is_current(&state.slab[slot].value) {
            return false;
        }
        state.move_to_head(slot);
        true
    }

    /// Evict up to `count` entries, least recently used first
    ///
    /// Returns the number of entries evicted.
    pub fn drop_oldest(&self, count: usize) -> usize {
        let evicted: Vec<(K, V)> = {
            let mut state = self.state.lock();
            let count = count.min(state.len());
            let mut evicted = Vec::with_capacity(count);
            for _ in 0..count {
                let tail = state.tail;
                evicted.push(state.remove_slot(tail));
            }
            state.stats.evictions += count as u64;
            evicted
        };
        let dropped = evicted.len();
        for entry in evicted {
            self.notify_evicted(Some(entry));
        }
        dropped
    }

    /// Remove a key regardless of its position
    pub fn remove(&self, key: &K) -> Option<V> {
        self.state.lock().remove(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.state.lock().index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> Vec<K> {
        let state = self.state.lock();
        let mut keys = Vec::with_capacity(state.len());
        let mut slot = state.head;
        while slot != SENTINEL {
            keys.push(state.slab[slot].key.clone());
            slot = state.slab[slot].next;
        }
        keys
    }

    pub fn stats(&self) -> LruStats {
        let state = self.state.lock();
        LruStats {
            len: state.len(),
            ..state.stats
        }
    }

    fn notify_evicted(&self, evicted: Option<(K, V)>) {
        if let (Some(listener), Some((key, value))) = (&self.on_evict, evicted) {
            listener(&key, &value);
        }
    }
}

impl<K: Eq + Hash + Clone, V> std::fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCache")
            .field("capacity", &self.capacity)
            .field("len", &self.state.lock().index.len())
            .finish()
    }
}
