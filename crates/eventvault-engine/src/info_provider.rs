//! Stream catalogue and deletion

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use eventvault_core::{StoreError, StreamId, StreamInfo, StreamInfoProvider, StreamType};
use eventvault_storage::PersistenceCoordinator;
use tracing::{info, instrument};

use crate::pending::PendingWrites;
use crate::stream_cache::StreamCache;

/// Answers catalogue queries from the cache first, then from disk
///
/// Resident counts include events still queued for write-back, so a stream
/// appended to moments ago is reported even before its extent exists.
#[derive(Debug)]
pub struct StreamInfoService {
    cache: Arc<StreamCache>,
    persistence: Arc<PersistenceCoordinator>,
    pending: Arc<PendingWrites>,
}

impl StreamInfoService {
    pub fn new(
        cache: Arc<StreamCache>,
        persistence: Arc<PersistenceCoordinator>,
        pending: Arc<PendingWrites>,
    ) -> Self {
        Self {
            cache,
            persistence,
            pending,
        }
    }

    /// Event count of a resident, non-empty stream
    async fn resident_count(&self, stream_id: &StreamId) -> Option<u64> {
        let entry = self.cache.peek(stream_id)?;
        let len = entry.len().await as u64;
        (len > 0).then_some(len)
    }
}

#[async_trait]
impl StreamInfoProvider for StreamInfoService {
    async fn get_streams_info(
        &self,
        type_filter: Option<&StreamType>,
    ) -> Result<Vec<StreamInfo>, StoreError> {
        // Keyed by (type, key) so the listing comes out in catalogue order
        let mut catalogue = BTreeMap::new();

        for extent in self.persistence.list_streams(type_filter).await? {
            let id = extent.stream_id;
            catalogue.insert((id.stream_type.clone(), id.key), id);
        }
        for id in self.cache.resident_streams() {
            if type_filter.is_some_and(|filter| *filter != id.stream_type) {
                continue;
            }
            catalogue
                .entry((id.stream_type.clone(), id.key))
                .or_insert(id);
        }

        let mut infos = Vec::with_capacity(catalogue.len());
        for stream_id in catalogue.into_values() {
            if let Some(info) = self.get_stream_info(&stream_id).await? {
                infos.push(info);
            }
        }
        Ok(infos)
    }

    async fn get_stream_info(&self, stream_id: &StreamId) -> Result<Option<StreamInfo>, StoreError> {
        let event_count = match self.resident_count(stream_id).await {
            Some(count) => Some(count),
            None => self.persistence.stream_length(stream_id).await?,
        };
        Ok(event_count.map(|event_count| StreamInfo {
            stream_id: stream_id.clone(),
            event_count,
        }))
    }

    #[instrument(skip_all, fields(stream = %stream_id))]
    async fn delete_stream(&self, stream_id: &StreamId) -> Result<(), StoreError> {
        // No append may be admitted against the old history, and nothing may
        // rehydrate it, until the extent is gone.
        let _population = self.cache.retire(stream_id).await;
        self.pending.wait_idle(stream_id).await;
        self.persistence.delete(stream_id).await?;
        info!("Deleted stream");
        Ok(())
    }
}
