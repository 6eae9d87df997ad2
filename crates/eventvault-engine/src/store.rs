//! The embeddable event store
//!
//! [`EventStore`] wires the storage pipeline together and owns its two
//! background tasks:
//!
//! ```text
//! writer ──► stream cache (authoritative) ──► hand-off ──► write-back worker ──► extents
//!                   ▲                                                   │
//! reader ───────────┘◄──────────── hydration on miss ───────────────────┘
//!                   ▲
//! memory watcher ───┘ (drops oldest streams under pressure)
//! ```

use std::sync::Arc;

use eventvault_core::{Clock, EventsReader, EventsWriter, StreamInfoProvider, SystemClock};
use eventvault_storage::PersistenceCoordinator;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::info_provider::StreamInfoService;
use crate::memory_watcher::{MemoryProbe, MemoryWatcher, SysinfoProbe};
use crate::pending::PendingWrites;
use crate::reader::StreamReader;
use crate::stream_cache::StreamCache;
use crate::write_back::{HandOff, WriteBackReport, WriteBackWorker};
use crate::writer::StreamWriter;

struct BackgroundTasks {
    write_back: JoinHandle<WriteBackReport>,
    memory_watcher: JoinHandle<()>,
}

pub struct EventStore {
    config: EngineConfig,
    persistence: Arc<PersistenceCoordinator>,
    pending: Arc<PendingWrites>,
    cache: Arc<StreamCache>,
    hand_off: Arc<HandOff>,
    reader: Arc<StreamReader>,
    writer: Arc<StreamWriter>,
    info: Arc<StreamInfoService>,
    watcher_cancel: CancellationToken,
    tasks: Mutex<Option<BackgroundTasks>>,
}

impl EventStore {
    /// Open a store with the system clock and process memory probe
    ///
    /// Must be called within a tokio runtime.
    pub async fn open(config: EngineConfig) -> Result<Self, EngineError> {
        Self::open_with(config, Arc::new(SystemClock), Box::new(SysinfoProbe::new())).await
    }

    /// Open a store with an injected clock and memory probe
    #[instrument(skip_all, fields(data_dir = %config.data_dir.display()))]
    pub async fn open_with(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        probe: Box<dyn MemoryProbe>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        tokio::fs::create_dir_all(&config.data_dir).await?;

        let persistence = Arc::new(PersistenceCoordinator::new(config.persistence()));
        let pending = Arc::new(PendingWrites::new());
        let cache = Arc::new(StreamCache::new(
            config.max_cached_streams,
            config.hydration_page_size,
            persistence.clone(),
            pending.clone(),
        ));
        let (hand_off, receiver) = HandOff::channel(config.write_queue_capacity);

        let reader = Arc::new(StreamReader::new(cache.clone(), config.max_read_page_size));
        let writer = Arc::new(StreamWriter::new(
            cache.clone(),
            pending.clone(),
            hand_off.clone(),
            clock,
            config.max_event_size,
        ));
        let info = Arc::new(StreamInfoService::new(
            cache.clone(),
            persistence.clone(),
            pending.clone(),
        ));

        let write_back =
            WriteBackWorker::new(receiver, persistence.clone(), pending.clone()).spawn();
        let watcher_cancel = CancellationToken::new();
        let memory_watcher = MemoryWatcher::new(
            cache.clone(),
            probe,
            config.max_process_memory_bytes,
            config.memory_check_interval(),
            config.eviction_fraction,
        )
        .spawn(watcher_cancel.clone());

        info!(
            max_cached_streams = config.max_cached_streams,
            bounded_queue = config.write_queue_capacity.is_some(),
            "Event store opened"
        );

        Ok(Self {
            config,
            persistence,
            pending,
            cache,
            hand_off,
            reader,
            writer,
            info,
            watcher_cancel,
            tasks: Mutex::new(Some(BackgroundTasks {
                write_back,
                memory_watcher,
            })),
        })
    }

    pub fn reader(&self) -> Arc<dyn EventsReader> {
        self.reader.clone()
    }

    pub fn writer(&self) -> Arc<dyn EventsWriter> {
        self.writer.clone()
    }

    pub fn info(&self) -> Arc<dyn StreamInfoProvider> {
        self.info.clone()
    }

    /// The concrete reader, for page-level access
    pub fn stream_reader(&self) -> &Arc<StreamReader> {
        &self.reader
    }

    pub fn cache(&self) -> &Arc<StreamCache> {
        &self.cache
    }

    pub fn persistence(&self) -> &Arc<PersistenceCoordinator> {
        &self.persistence
    }

    pub fn pending(&self) -> &Arc<PendingWrites> {
        &self.pending
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Wait until every admitted batch has been processed by the worker
    pub async fn flush(&self) {
        self.pending.wait_all_idle().await;
    }

    /// Stop accepting writes, drain the write-back queue and join the tasks
    ///
    /// Appends after shutdown fail with `CannotInitiateWrite`. Calling this
    /// again returns an empty report.
    #[instrument(skip_all)]
    pub async fn shutdown(&self) -> Result<WriteBackReport, EngineError> {
        let Some(tasks) = self.tasks.lock().take() else {
            return Ok(WriteBackReport::default());
        };

        self.watcher_cancel.cancel();
        self.hand_off.close();

        let report = tasks.write_back.await?;
        tasks.memory_watcher.await?;

        info!(
            batches = report.batches_written,
            events = report.events_written,
            failed = report.batches_failed,
            "Event store shut down"
        );
        Ok(report)
    }
}

impl Drop for EventStore {
    fn drop(&mut self) {
        // The worker keeps draining on its own once the hand-off is gone
        self.watcher_cancel.cancel();
        self.hand_off.close();
    }
}
