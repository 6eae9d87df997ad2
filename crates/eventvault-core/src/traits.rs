//! Collaborator traits for EventVault
//!
//! Transports (HTTP, RPC) consume the store exclusively through
//! [`EventsReader`], [`EventsWriter`] and [`StreamInfoProvider`], so the
//! storage pipeline behind them can change freely.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::event::{Event, NewEvent};
use crate::stream::{StreamId, StreamType};

/// Sentinel start position meaning "the most recent event"
///
/// Only meaningful for [`ReadDirection::Backward`] reads.
pub const END: i64 = i64::MAX;

/// Direction of a paged read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReadDirection {
    /// Oldest to newest
    #[default]
    Forward,
    /// Newest to oldest
    Backward,
}

/// Lazily produced page of events
pub type EventStream = BoxStream<'static, Event>;

/// Summary of a stream in the catalogue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub stream_id: StreamId,
    /// Number of events, including events not yet written back
    pub event_count: u64,
}

/// Paged access to a stream's events
#[async_trait]
pub trait EventsReader: Send + Sync {
    /// Read one page of events starting at `start_position`
    ///
    /// Forward reads start at a 0-based index. Backward reads start at a
    /// valid index or at [`END`]. Out-of-range positions produce an empty
    /// page; negative positions are rejected as bad requests.
    async fn read(
        &self,
        stream_id: &StreamId,
        start_position: i64,
        direction: ReadDirection,
        cancel: &CancellationToken,
    ) -> Result<EventStream, StoreError>;
}

/// Append access to streams
#[async_trait]
pub trait EventsWriter: Send + Sync {
    /// Append events to a stream
    ///
    /// When `expected_version` is supplied it must equal the stream's
    /// current event count. Success means the events are admitted to the
    /// in-memory stream and queued for write-back, not that they are on disk.
    async fn append(
        &self,
        stream_id: &StreamId,
        events: Vec<NewEvent>,
        expected_version: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError>;
}

/// Stream catalogue and lifecycle
#[async_trait]
pub trait StreamInfoProvider: Send + Sync {
    /// All known streams, optionally restricted to one type
    async fn get_streams_info(
        &self,
        type_filter: Option<&StreamType>,
    ) -> Result<Vec<StreamInfo>, StoreError>;

    /// A single stream, or `None` if it does not exist
    async fn get_stream_info(&self, stream_id: &StreamId) -> Result<Option<StreamInfo>, StoreError>;

    /// Delete a stream's extent and cached state
    async fn delete_stream(&self, stream_id: &StreamId) -> Result<(), StoreError>;
}

/// Time source for event id generation
///
/// Tests substitute a controllable clock to exercise same-tick behavior.
pub trait Clock: Send + Sync {
    /// Current time in monotonic ticks
    fn now_ticks(&self) -> i64;
}

/// Real clock: microseconds since the Unix epoch
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ticks(&self) -> i64 {
        Utc::now().timestamp_micros()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    ticks: AtomicI64,
}

impl ManualClock {
    pub fn new(ticks: i64) -> Self {
        Self {
            ticks: AtomicI64::new(ticks),
        }
    }

    pub fn set(&self, ticks: i64) {
        self.ticks.store(ticks, Ordering::SeqCst);
    }

    pub fn advance(&self, delta: i64) {
        self.ticks.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ticks(&self) -> i64 {
        self.ticks.load(Ordering::SeqCst)
    }
}
