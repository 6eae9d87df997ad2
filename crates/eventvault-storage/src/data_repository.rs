//! Data repository
//!
//! The data file is a run of `[type buffer][payload]` records. The type
//! buffer is always [`MAX_EVENT_TYPE_LENGTH`] bytes, zero padded; its
//! meaningful length and the payload length live in the matching header.
//!
//! Appends produce the headers describing what they wrote but never write
//! them; ordering data before headers is the coordinator's job.

use std::io::SeekFrom;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use eventvault_core::{Event, MAX_EVENT_TYPE_LENGTH};
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace};

use crate::error::StorageError;
use crate::extent::ExtentInfo;
use crate::header_repository::HeaderStream;
use crate::io::{boxed, check_cancelled, open_existing};
use crate::raw_header::RawHeader;

/// Lazy sequence of events reconstructed from the data file
pub type EventRecordStream = BoxStream<'static, Result<Event, StorageError>>;

/// Encoded type names kept before the cache is reset
const TYPE_CACHE_LIMIT: usize = 1024;

/// Fixed-width encoding of an event type
#[derive(Debug)]
struct TypeBuffer {
    bytes: [u8; MAX_EVENT_TYPE_LENGTH],
    len: i16,
}

impl TypeBuffer {
    /// UTF-8 encode, truncating on a character boundary
    fn encode(event_type: &str) -> Self {
        let mut end = event_type.len().min(MAX_EVENT_TYPE_LENGTH);
        while !event_type.is_char_boundary(end) {
            end -= 1;
        }
        let mut bytes = [0u8; MAX_EVENT_TYPE_LENGTH];
        bytes[..end].copy_from_slice(&event_type.as_bytes()[..end]);
        Self {
            bytes,
            len: end as i16,
        }
    }
}

/// Reads and appends a stream's data file
#[derive(Debug, Default)]
pub struct DataRepository {
    sync_on_write: bool,
    type_buffers: DashMap<String, Arc<TypeBuffer>>,
}

impl DataRepository {
    pub fn new(sync_on_write: bool) -> Self {
        Self {
            sync_on_write,
            type_buffers: DashMap::new(),
        }
    }

    fn type_buffer(&self, event_type: &str) -> Arc<TypeBuffer> {
        if let Some(buffer) = self.type_buffers.get(event_type) {
            return Arc::clone(buffer.value());
        }
        let buffer = Arc::new(TypeBuffer::encode(event_type));
        if self.type_buffers.len() >= TYPE_CACHE_LIMIT {
            self.type_buffers.clear();
        }
        self.type_buffers
            .insert(event_type.to_owned(), Arc::clone(&buffer));
        buffer
    }

    /// Append events and return one header per event, in order
    ///
    /// Each header records the offset the record was written at. On
    /// cancellation the bytes already written stay in the file as an
    /// orphaned tail that no header references.
    #[instrument(skip_all, fields(stream = %extent.stream_id, count = events.len()))]
    pub async fn append(
        &self,
        extent: &ExtentInfo,
        events: &[Event],
        cancel: &CancellationToken,
    ) -> Result<Vec<RawHeader>, StorageError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&extent.data_path)
            .await?;
        let mut offset = file.metadata().await?.len();
        let mut writer = BufWriter::new(file);
        let mut headers = Vec::with_capacity(events.len());

        for event in events {
            if cancel.is_cancelled() {
                writer.flush().await?;
                return Err(StorageError::Cancelled);
            }

            let data_length = i32::try_from(event.data.len()).map_err(|_| {
                StorageError::io(format!("payload of {} bytes too large", event.data.len()))
            })?;
            let type_buffer = self.type_buffer(&event.event_type);

            writer.write_all(&type_buffer.bytes).await?;
            writer.write_all(&event.data).await?;

            headers.push(RawHeader {
                id_timestamp: event.id.timestamp,
                id_sequence: i32::from(event.id.sequence),
                type_length: type_buffer.len,
                data_offset: offset as i64,
                data_length,
            });
            offset += (MAX_EVENT_TYPE_LENGTH + event.data.len()) as u64;
        }

        writer.flush().await?;
        if self.sync_on_write {
            writer.get_ref().sync_data().await?;
        }
        trace!(end_offset = offset, "Appended data records");
        Ok(headers)
    }

    /// Reconstruct events for a sequence of headers, lazily and in order
    ///
    /// Consecutive records are read without seeking; the type and payload
    /// buffers are reused across records.
    pub fn read(
        &self,
        extent: &ExtentInfo,
        headers: HeaderStream,
        cancel: CancellationToken,
    ) -> EventRecordStream {
        let path = extent.data_path.clone();

        boxed(async_stream::try_stream! {
            let mut headers = headers;
            let mut reader = open_existing(&path).await?.map(BufReader::new);
            let mut position: Option<u64> = None;
            let mut type_buf = [0u8; MAX_EVENT_TYPE_LENGTH];
            let mut payload: Vec<u8> = Vec::new();

            while let Some(header) = headers.next().await {
                let header = header?;
                check_cancelled(&cancel)?;
                let file = reader
                    .as_mut()
                    .ok_or_else(|| StorageError::corrupt("data file missing for existing headers"))?;

                let offset = header.data_offset as u64;
                if position != Some(offset) {
                    file.seek(SeekFrom::Start(offset)).await?;
                }

                file.read_exact(&mut type_buf).await?;
                let type_len = header.type_length as usize;
                let event_type = std::str::from_utf8(&type_buf[..type_len])
                    .map_err(|e| StorageError::corrupt(format!("event type is not UTF-8: {e}")))?
                    .to_owned();

                let data_len = header.data_length as usize;
                payload.resize(data_len, 0);
                file.read_exact(&mut payload[..]).await?;
                position = Some(offset + (MAX_EVENT_TYPE_LENGTH + data_len) as u64);

                let event = Event::new(header.event_id()?, event_type, Bytes::copy_from_slice(&payload));
                yield event;
            }
        })
    }
}
