//! Append coordinator
//!
//! An append is admitted in memory under the stream's mutation lock and then
//! handed to the write-back worker. The disk layer is never called from here.

use std::sync::Arc;

use async_trait::async_trait;
use eventvault_core::{
    Clock, Event, EventId, EventsWriter, MAX_EVENT_TYPE_LENGTH, NewEvent, StoreError, StreamId,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::pending::PendingWrites;
use crate::stream_cache::StreamCache;
use crate::write_back::{HandOff, IncomingEventsBatch};

pub struct StreamWriter {
    cache: Arc<StreamCache>,
    pending: Arc<PendingWrites>,
    hand_off: Arc<HandOff>,
    clock: Arc<dyn Clock>,
    max_event_size: usize,
}

impl StreamWriter {
    pub fn new(
        cache: Arc<StreamCache>,
        pending: Arc<PendingWrites>,
        hand_off: Arc<HandOff>,
        clock: Arc<dyn Clock>,
        max_event_size: usize,
    ) -> Self {
        Self {
            cache,
            pending,
            hand_off,
            clock,
            max_event_size,
        }
    }

    fn validate(&self, events: &[NewEvent]) -> Result<(), StoreError> {
        for (index, event) in events.iter().enumerate() {
            if event.event_type.is_empty() {
                return Err(StoreError::bad_request(format!(
                    "event {index} has an empty type"
                )));
            }
            if event.event_type.len() > MAX_EVENT_TYPE_LENGTH {
                return Err(StoreError::bad_request(format!(
                    "event {index} type is {} bytes, limit is {MAX_EVENT_TYPE_LENGTH}",
                    event.event_type.len()
                )));
            }
            if event.data.len() > self.max_event_size {
                return Err(StoreError::bad_request(format!(
                    "event {index} payload is {} bytes, limit is {}",
                    event.data.len(),
                    self.max_event_size
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventsWriter for StreamWriter {
    #[instrument(skip_all, fields(stream = %stream_id, count = events.len()))]
    async fn append(
        &self,
        stream_id: &StreamId,
        events: Vec<NewEvent>,
        expected_version: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }
        self.validate(&events)?;

        loop {
            let entry = self.cache.get_events(stream_id, cancel).await?;
            let mut cached = tokio::select! {
                guard = entry.write() => guard,
                _ = cancel.cancelled() => return Err(StoreError::Cancelled),
            };

            // Counted before the identity check, so a hydration racing an
            // eviction of this entry waits for the batch below to land
            self.pending.begin(stream_id);
            if !self.cache.is_current(stream_id, &entry) {
                self.pending.end(stream_id);
                continue;
            }

            let actual = cached.len() as u64;
            if let Some(expected) = expected_version {
                if expected != actual {
                    self.pending.end(stream_id);
                    return Err(StoreError::VersionMismatch { expected, actual });
                }
            }

            let now = self.clock.now_ticks();
            let mut previous = cached.last().map(|event| event.id);
            let stamped: Vec<Event> = events
                .into_iter()
                .map(|event| {
                    let id = match previous {
                        Some(prev) => prev.next_after(now),
                        None => EventId::first(now),
                    };
                    previous = Some(id);
                    event.with_id(id)
                })
                .collect();

            let batch = IncomingEventsBatch {
                stream_id: stream_id.clone(),
                events: stamped.clone(),
            };
            if let Err(rejection) = self.hand_off.try_send(batch) {
                self.pending.end(stream_id);
                warn!(%rejection, "Append rejected by write-back queue");
                return Err(StoreError::cannot_initiate_write(rejection.to_string()));
            }

            cached.extend(stamped);
            debug!(version = cached.len(), "Appended events");
            self.cache.update(stream_id, &entry);
            return Ok(());
        }
    }
}
