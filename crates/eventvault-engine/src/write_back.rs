//! Write-back hand-off and worker
//!
//! Appends complete in memory and queue an [`IncomingEventsBatch`]; a single
//! worker drains the queue into the persistence coordinator. One consumer and
//! one queue keep per-stream disk order equal to admission order.

use std::fmt;
use std::sync::Arc;

use eventvault_core::{Event, StreamId};
use eventvault_storage::PersistenceCoordinator;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::pending::PendingWrites;

/// Events admitted to one stream's cache, awaiting persistence
#[derive(Debug, Clone)]
pub struct IncomingEventsBatch {
    pub stream_id: StreamId,
    pub events: Vec<Event>,
}

/// Why the hand-off refused a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandOffRejection {
    /// The queue was closed by shutdown
    Closed,
    /// A bounded queue is at capacity
    Full,
}

impl fmt::Display for HandOffRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandOffRejection::Closed => write!(f, "write queue is closed"),
            HandOffRejection::Full => write!(f, "write queue is full"),
        }
    }
}

#[derive(Debug)]
enum BatchSender {
    Unbounded(mpsc::UnboundedSender<IncomingEventsBatch>),
    Bounded(mpsc::Sender<IncomingEventsBatch>),
}

/// Receiving half of the hand-off queue
#[derive(Debug)]
pub enum BatchReceiver {
    Unbounded(mpsc::UnboundedReceiver<IncomingEventsBatch>),
    Bounded(mpsc::Receiver<IncomingEventsBatch>),
}

impl BatchReceiver {
    /// Next batch; `None` once the queue is closed and drained
    pub async fn recv(&mut self) -> Option<IncomingEventsBatch> {
        match self {
            BatchReceiver::Unbounded(rx) => rx.recv().await,
            BatchReceiver::Bounded(rx) => rx.recv().await,
        }
    }
}

/// Sending half of the hand-off queue, closable while shared
#[derive(Debug)]
pub struct HandOff {
    sender: Mutex<Option<BatchSender>>,
}

impl HandOff {
    /// Create the queue; `capacity` of `None` makes it unbounded
    pub fn channel(capacity: Option<usize>) -> (Arc<HandOff>, BatchReceiver) {
        let (sender, receiver) = match capacity {
            Some(capacity) => {
                let (tx, rx) = mpsc::channel(capacity.max(1));
                (BatchSender::Bounded(tx), BatchReceiver::Bounded(rx))
            }
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (BatchSender::Unbounded(tx), BatchReceiver::Unbounded(rx))
            }
        };
        let hand_off = Arc::new(HandOff {
            sender: Mutex::new(Some(sender)),
        });
        (hand_off, receiver)
    }

    /// Queue a batch without waiting
    pub fn try_send(&self, batch: IncomingEventsBatch) -> Result<(), HandOffRejection> {
        let sender = self.sender.lock();
        match sender.as_ref() {
            None => Err(HandOffRejection::Closed),
            Some(BatchSender::Unbounded(tx)) => {
                tx.send(batch).map_err(|_| HandOffRejection::Closed)
            }
            Some(BatchSender::Bounded(tx)) => tx.try_send(batch).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => HandOffRejection::Full,
                mpsc::error::TrySendError::Closed(_) => HandOffRejection::Closed,
            }),
        }
    }

    /// Refuse further batches; already queued batches are still delivered
    pub fn close(&self) {
        self.sender.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

/// Totals reported by the worker when it stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteBackReport {
    pub batches_written: u64,
    pub events_written: u64,
    pub batches_failed: u64,
}

/// Single consumer persisting queued batches
pub struct WriteBackWorker {
    receiver: BatchReceiver,
    persistence: Arc<PersistenceCoordinator>,
    pending: Arc<PendingWrites>,
    report: WriteBackReport,
}

impl WriteBackWorker {
    pub fn new(
        receiver: BatchReceiver,
        persistence: Arc<PersistenceCoordinator>,
        pending: Arc<PendingWrites>,
    ) -> Self {
        Self {
            receiver,
            persistence,
            pending,
            report: WriteBackReport::default(),
        }
    }

    /// Spawn the worker as a background task
    pub fn spawn(self) -> JoinHandle<WriteBackReport> {
        tokio::spawn(self.run())
    }

    /// Drain the queue until it is closed and empty
    ///
    /// A failed batch is logged and dropped so one stream's failure never
    /// stalls the others.
    pub async fn run(mut self) -> WriteBackReport {
        info!("Write-back worker started");
        // Batches already admitted are always finished, so nothing here
        // observes cancellation.
        let never = CancellationToken::new();

        while let Some(batch) = self.receiver.recv().await {
            let count = batch.events.len();
            match self
                .persistence
                .append(&batch.stream_id, &batch.events, &never)
                .await
            {
                Ok(()) => {
                    self.report.batches_written += 1;
                    self.report.events_written += count as u64;
                    debug!(stream = %batch.stream_id, count, "Wrote back batch");
                }
                Err(e) => {
                    self.report.batches_failed += 1;
                    error!(
                        stream = %batch.stream_id,
                        count,
                        error = %e,
                        "Write-back failed, dropping batch"
                    );
                }
            }
            self.pending.end(&batch.stream_id);
        }

        info!(
            batches = self.report.batches_written,
            events = self.report.events_written,
            failed = self.report.batches_failed,
            "Write-back worker stopped"
        );
        self.report
    }
}
