//! Tracking of write-back batches that are queued but not yet processed
//!
//! The writer admits events to the cache before they reach disk. Anything
//! that rebuilds a stream from disk (hydration after eviction) or removes it
//! (deletion) must first wait for that gap to close.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use eventvault_core::StreamId;
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct PendingWrites {
    counts: DashMap<StreamId, usize>,
    idle: Notify,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a batch about to be handed to the write-back worker
    pub fn begin(&self, stream_id: &StreamId) {
        *self.counts.entry(stream_id.clone()).or_insert(0) += 1;
    }

    /// Record a batch as processed, successfully or not
    pub fn end(&self, stream_id: &StreamId) {
        if let Entry::Occupied(mut entry) = self.counts.entry(stream_id.clone()) {
            *entry.get_mut() -= 1;
            if *entry.get() == 0 {
                entry.remove();
            }
        }
        self.idle.notify_waiters();
    }

    pub fn is_idle(&self, stream_id: &StreamId) -> bool {
        !self.counts.contains_key(stream_id)
    }

    /// Batches outstanding across all streams
    pub fn total(&self) -> usize {
        self.counts.iter().map(|entry| *entry.value()).sum()
    }

    /// Wait until `stream_id` has no outstanding batches
    pub async fn wait_idle(&self, stream_id: &StreamId) {
        self.wait_until(|| self.is_idle(stream_id)).await;
    }

    /// Wait until no stream has outstanding batches
    pub async fn wait_all_idle(&self) {
        self.wait_until(|| self.counts.is_empty()).await;
    }

    async fn wait_until(&self, done: impl Fn() -> bool) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent `end` is not missed
            notified.as_mut().enable();
            if done() {
                return;
            }
            notified.await;
        }
    }
}
