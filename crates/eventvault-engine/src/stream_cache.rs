//! Stream cache
//!
//! Holds each resident stream's full event history in memory. A miss hydrates
//! the stream from disk in pages; concurrent misses on one stream share a
//! single hydration.

use std::sync::Arc;

use eventvault_core::{Event, KeyedLockGuard, StoreError, StreamId};
use eventvault_storage::PersistenceCoordinator;
use futures::TryStreamExt;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::lru::{LruCache, LruStats};
use crate::pending::PendingWrites;

/// The authoritative in-memory view of one stream
///
/// The lock doubles as the stream's mutation lock: appends hold the write
/// guard from the version check until the cache is updated. An entry stays
/// authoritative only while it is the one the cache holds for its stream.
#[derive(Debug, Default)]
pub struct CachedEvents {
    events: RwLock<Vec<Event>>,
}

impl CachedEvents {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events: RwLock::new(events),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, Vec<Event>> {
        self.events.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, Vec<Event>> {
        self.events.write().await
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// LRU of hydrated streams
#[derive(Debug)]
pub struct StreamCache {
    lru: LruCache<StreamId, Arc<CachedEvents>>,
    persistence: Arc<PersistenceCoordinator>,
    pending: Arc<PendingWrites>,
    hydration_page_size: usize,
}

impl StreamCache {
    pub fn new(
        capacity: usize,
        hydration_page_size: usize,
        persistence: Arc<PersistenceCoordinator>,
        pending: Arc<PendingWrites>,
    ) -> Self {
        let lru = LruCache::new(capacity).with_eviction_listener(Arc::new(
            |stream_id: &StreamId, _: &Arc<CachedEvents>| {
                debug!(stream = %stream_id, "Evicted stream from cache");
            },
        ));
        Self {
            lru,
            persistence,
            pending,
            hydration_page_size: hydration_page_size.max(1),
        }
    }

    /// The stream's cached events, hydrating from disk on a miss
    pub async fn get_events(
        &self,
        stream_id: &StreamId,
        cancel: &CancellationToken,
    ) -> Result<Arc<CachedEvents>, StoreError> {
        self.lru
            .get_or_add(stream_id, || self.hydrate(stream_id, cancel))
            .await
    }

    /// Whether `entry` is the one currently cached for `stream_id`
    pub fn is_current(&self, stream_id: &StreamId, entry: &Arc<CachedEvents>) -> bool {
        self.lru
            .peek(stream_id)
            .is_some_and(|cached| Arc::ptr_eq(&cached, entry))
    }

    /// Record a mutated entry as most recently used
    ///
    /// An entry evicted meanwhile is not reinstated; the next miss hydrates
    /// it from disk once its queued write-backs land. Returns whether the
    /// entry was still cached.
    pub fn update(&self, stream_id: &StreamId, entry: &Arc<CachedEvents>) -> bool {
        self.lru
            .touch_if(stream_id, |cached| Arc::ptr_eq(cached, entry))
    }

    /// The resident entry, without promoting it or hydrating
    pub fn peek(&self, stream_id: &StreamId) -> Option<Arc<CachedEvents>> {
        self.lru.peek(stream_id)
    }

    pub fn contains_key(&self, stream_id: &StreamId) -> bool {
        self.lru.contains_key(stream_id)
    }

    pub fn remove(&self, stream_id: &StreamId) -> Option<Arc<CachedEvents>> {
        self.lru.remove(stream_id)
    }

    /// Drop the resident entry and hold off rehydrating the stream
    ///
    /// The entry is removed under its write lock, so any append already
    /// admitted to it has registered its pending write-back. Appends still
    /// holding the retired entry fail [`is_current`](Self::is_current) and
    /// wait on the returned guard before hydrating again.
    pub async fn retire(&self, stream_id: &StreamId) -> KeyedLockGuard<'_, StreamId> {
        let population = self.lru.hold_population(stream_id).await;
        if let Some(entry) = self.lru.peek(stream_id) {
            let _mutation = entry.write().await;
            self.lru.remove(stream_id);
        }
        population
    }

    /// Evict up to `count` least recently used streams
    pub fn drop_oldest(&self, count: usize) -> usize {
        self.lru.drop_oldest(count)
    }

    /// Resident streams, most recently used first
    pub fn resident_streams(&self) -> Vec<StreamId> {
        self.lru.keys()
    }

    pub fn len(&self) -> usize {
        self.lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lru.is_empty()
    }

    pub fn stats(&self) -> LruStats {
        self.lru.stats()
    }

    /// Load a stream's full history in pages
    ///
    /// Waits for the stream's queued write-backs first, so a stream evicted
    /// with events still in flight comes back complete.
    #[instrument(skip_all, fields(stream = %stream_id))]
    async fn hydrate(
        &self,
        stream_id: &StreamId,
        cancel: &CancellationToken,
    ) -> Result<Arc<CachedEvents>, StoreError> {
        tokio::select! {
            _ = self.pending.wait_idle(stream_id) => {}
            _ = cancel.cancelled() => return Err(StoreError::Cancelled),
        }

        let page_size = self.hydration_page_size as u64;
        let mut events: Vec<Event> = Vec::new();
        loop {
            let page: Vec<Event> = self
                .persistence
                .read(stream_id, Some(events.len() as u64), Some(page_size), cancel)
                .await?
                .try_collect()
                .await?;
            let complete = (page.len() as u64) < page_size;
            events.extend(page);
            if complete {
                break;
            }
        }

        debug!(count = events.len(), "Hydrated stream");
        Ok(Arc::new(CachedEvents::new(events)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use eventvault_core::{EventId, StreamType};
    use eventvault_storage::PersistenceConfig;
    use tempfile::TempDir;

    fn setup(temp: &TempDir, capacity: usize) -> (StreamCache, Arc<PersistenceCoordinator>, Arc<PendingWrites>) {
        let persistence = Arc::new(PersistenceCoordinator::new(PersistenceConfig {
            base_dir: temp.path().to_path_buf(),
            ..Default::default()
        }));
        let pending = Arc::new(PendingWrites::new());
        let cache = StreamCache::new(capacity, 7, persistence.clone(), pending.clone());
        (cache, persistence, pending)
    }

    fn stream() -> StreamId {
        StreamId::random(StreamType::new("orders").unwrap())
    }

    fn events(count: i64) -> Vec<Event> {
        (0..count)
            .map(|i| Event::new(EventId::new(i, 0), "created", Bytes::from(vec![i as u8; 4])))
            .collect()
    }

    #[tokio::test]
    async fn test_hydrates_across_pages() {
        let temp = TempDir::new().unwrap();
        let (cache, persistence, _) = setup(&temp, 4);
        let id = stream();
        let cancel = CancellationToken::new();
        // Page size 7: 21 events exactly fill three pages
        persistence.append(&id, &events(21), &cancel).await.unwrap();

        let entry = cache.get_events(&id, &cancel).await.unwrap();
        assert_eq!(*entry.read().await, events(21));
        assert!(cache.contains_key(&id));

        // Second access is a hit on the same entry
        let again = cache.get_events(&id, &cancel).await.unwrap();
        assert!(Arc::ptr_eq(&entry, &again));
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_unknown_stream_hydrates_empty() {
        let temp = TempDir::new().unwrap();
        let (cache, _, _) = setup(&temp, 4);
        let entry = cache.get_events(&stream(), &CancellationToken::new()).await.unwrap();
        assert!(entry.is_empty().await);
    }

    #[tokio::test]
    async fn test_capacity_eviction_retires_entry() {
        let temp = TempDir::new().unwrap();
        let (cache, _, _) = setup(&temp, 1);
        let cancel = CancellationToken::new();
        let a = stream();
        let b = stream();

        let first = cache.get_events(&a, &cancel).await.unwrap();
        assert!(cache.is_current(&a, &first));
        cache.get_events(&b, &cancel).await.unwrap();

        assert!(!cache.contains_key(&a));
        assert!(!cache.is_current(&a, &first));
        assert_eq!(cache.resident_streams(), vec![b]);
    }

    #[tokio::test]
    async fn test_update_never_reinstates_evicted_entry() {
        let temp = TempDir::new().unwrap();
        let (cache, _, _) = setup(&temp, 2);
        let cancel = CancellationToken::new();
        let a = stream();
        let b = stream();
        let entry_a = cache.get_events(&a, &cancel).await.unwrap();
        cache.get_events(&b, &cancel).await.unwrap();

        assert!(cache.update(&a, &entry_a));
        assert_eq!(cache.resident_streams(), vec![a.clone(), b]);

        cache.remove(&a);
        assert!(!cache.update(&a, &entry_a));
        assert!(!cache.contains_key(&a));

        // A stranger entry for a cached stream is not promoted either
        let fresh = cache.get_events(&a, &cancel).await.unwrap();
        assert!(!cache.update(&a, &Arc::new(CachedEvents::new(events(1)))));
        assert!(cache.is_current(&a, &fresh));
    }

    #[tokio::test]
    async fn test_hydration_waits_for_pending_write_back() {
        let temp = TempDir::new().unwrap();
        let (cache, persistence, pending) = setup(&temp, 2);
        let cache = Arc::new(cache);
        let id = stream();
        pending.begin(&id);

        let hydration = {
            let cache = cache.clone();
            let id = id.clone();
            tokio::spawn(async move { cache.get_events(&id, &CancellationToken::new()).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!hydration.is_finished());

        persistence
            .append(&id, &events(3), &CancellationToken::new())
            .await
            .unwrap();
        pending.end(&id);

        let entry = hydration.await.unwrap().unwrap();
        assert_eq!(entry.len().await, 3);
    }

    #[tokio::test]
    async fn test_cancelled_hydration_caches_nothing() {
        let temp = TempDir::new().unwrap();
        let (cache, persistence, _) = setup(&temp, 2);
        let id = stream();
        persistence
            .append(&id, &events(3), &CancellationToken::new())
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = cache.get_events(&id, &cancel).await.unwrap_err();
        assert_eq!(err, StoreError::Cancelled);
        assert!(!cache.contains_key(&id));
    }

    #[tokio::test]
    async fn test_remove_and_drop_oldest() {
        let temp = TempDir::new().unwrap();
        let (cache, _, _) = setup(&temp, 4);
        let cancel = CancellationToken::new();
        let ids: Vec<_> = (0..3).map(|_| stream()).collect();
        for id in &ids {
            cache.get_events(id, &cancel).await.unwrap();
        }

        let removed = cache.remove(&ids[1]).unwrap();
        assert!(!cache.is_current(&ids[1], &removed));
        assert!(cache.remove(&ids[1]).is_none());

        assert_eq!(cache.drop_oldest(1), 1);
        assert_eq!(cache.resident_streams(), vec![ids[2].clone()]);
    }

    #[tokio::test]
    async fn test_retire_waits_for_mutation_and_blocks_hydration() {
        let temp = TempDir::new().unwrap();
        let (cache, persistence, _) = setup(&temp, 4);
        let cache = Arc::new(cache);
        let cancel = CancellationToken::new();
        let id = stream();
        persistence.append(&id, &events(2), &cancel).await.unwrap();
        let entry = cache.get_events(&id, &cancel).await.unwrap();

        // An in-flight append holds the entry's write lock
        let mutation = entry.write().await;
        let retiring = {
            let cache = cache.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let _population = cache.retire(&id).await;
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!retiring.is_finished());
        assert!(cache.is_current(&id, &entry));
        drop(mutation);

        // Once retired, a miss waits for the guard to drop
        while cache.is_current(&id, &entry) {
            tokio::task::yield_now().await;
        }
        let rehydrated = {
            let cache = cache.clone();
            let id = id.clone();
            tokio::spawn(async move { cache.get_events(&id, &CancellationToken::new()).await })
        };
        tokio::task::yield_now().await;
        assert!(!rehydrated.is_finished());

        retiring.await.unwrap();
        let fresh = rehydrated.await.unwrap().unwrap();
        assert!(!Arc::ptr_eq(&fresh, &entry));
        assert_eq!(fresh.len().await, 2);
    }
}
