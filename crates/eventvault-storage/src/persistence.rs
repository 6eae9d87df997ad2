//! Persistence coordinator
//!
//! Composes the header and data repositories behind one per-stream lock.
//! Appends write data records first and headers second, so a header only
//! becomes visible once the bytes it points at are written. A crash between
//! the two leaves an orphaned data tail, never a dangling header.

use std::path::PathBuf;
use std::time::Duration;

use eventvault_core::{Event, KeyedLocks, StreamId, StreamType};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::data_repository::{DataRepository, EventRecordStream};
use crate::error::StorageError;
use crate::extent::{ExtentInfo, ExtentLayout};
use crate::header_repository::HeaderRepository;

/// Configuration for the persistence layer
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Root directory holding one subdirectory per stream type
    pub base_dir: PathBuf,
    /// Whether to fsync after every append
    pub sync_on_write: bool,
    /// Attempts made to delete an extent's files
    pub delete_retry_attempts: u32,
    /// Pause between delete attempts
    pub delete_retry_delay: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./data/streams"),
            sync_on_write: false,
            delete_retry_attempts: 3,
            delete_retry_delay: Duration::from_millis(100),
        }
    }
}

/// Single entry point to a stream's durable extent
#[derive(Debug)]
pub struct PersistenceCoordinator {
    config: PersistenceConfig,
    layout: ExtentLayout,
    headers: HeaderRepository,
    data: DataRepository,
    /// Serializes appends and deletes per stream
    stream_locks: KeyedLocks<StreamId>,
}

impl PersistenceCoordinator {
    pub fn new(config: PersistenceConfig) -> Self {
        info!(path = %config.base_dir.display(), "Persistence coordinator initialized");
        Self {
            layout: ExtentLayout::new(config.base_dir.clone()),
            headers: HeaderRepository::new(config.sync_on_write),
            data: DataRepository::new(config.sync_on_write),
            stream_locks: KeyedLocks::new(),
            config,
        }
    }

    pub fn layout(&self) -> &ExtentLayout {
        &self.layout
    }

    /// Durably append events to a stream's extent
    #[instrument(skip_all, fields(stream = %stream_id, count = events.len()))]
    pub async fn append(
        &self,
        stream_id: &StreamId,
        events: &[Event],
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        if events.is_empty() {
            return Ok(());
        }

        let _guard = self.stream_locks.lock(stream_id).await;
        let extent = self
            .layout
            .get_extent_info(stream_id, true)
            .await?
            .ok_or_else(|| StorageError::io(format!("no extent for {stream_id}")))?;

        let headers = self.data.append(&extent, events, cancel).await?;
        self.headers.append(&extent, &headers, cancel).await?;

        debug!("Persisted events");
        Ok(())
    }

    /// Lazily read persisted events starting at position `skip`
    ///
    /// No lock is taken: files are append-only with a single writer, so the
    /// read sees the stream as of the moment its headers file is opened.
    /// A stream with either file missing reads as empty.
    pub async fn read(
        &self,
        stream_id: &StreamId,
        skip: Option<u64>,
        take: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<EventRecordStream, StorageError> {
        let Some(extent) = self.existing_extent(stream_id).await? else {
            return Ok(Box::pin(futures::stream::empty()));
        };
        let headers = self.headers.read(&extent, skip, take, cancel.clone());
        Ok(self.data.read(&extent, headers, cancel.clone()))
    }

    async fn existing_extent(&self, stream_id: &StreamId) -> Result<Option<ExtentInfo>, StorageError> {
        let Some(extent) = self.layout.get_extent_info(stream_id, false).await? else {
            return Ok(None);
        };
        if !fs::try_exists(&extent.data_path).await? {
            return Ok(None);
        }
        Ok(Some(extent))
    }

    /// Number of persisted events, or `None` if the stream has no extent
    pub async fn stream_length(&self, stream_id: &StreamId) -> Result<Option<u64>, StorageError> {
        match self.layout.get_extent_info(stream_id, false).await? {
            Some(extent) => Ok(Some(self.layout.stream_length(&extent).await?)),
            None => Ok(None),
        }
    }

    /// All streams with an extent on disk
    pub async fn list_streams(
        &self,
        stream_type: Option<&StreamType>,
    ) -> Result<Vec<ExtentInfo>, StorageError> {
        self.layout.get_all_extents_info(stream_type).await
    }

    /// Delete a stream's files
    ///
    /// Waits for any in-flight append on the same stream. Deleting a stream
    /// without files succeeds.
    #[instrument(skip_all, fields(stream = %stream_id))]
    pub async fn delete(&self, stream_id: &StreamId) -> Result<(), StorageError> {
        let _guard = self.stream_locks.lock(stream_id).await;
        let extent = self.layout.extent_for(stream_id);
        self.layout
            .delete_extent(
                &extent,
                self.config.delete_retry_attempts,
                self.config.delete_retry_delay,
            )
            .await?;
        info!("Deleted stream extent");
        Ok(())
    }
}
