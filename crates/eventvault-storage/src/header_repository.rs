//! Header repository
//!
//! Appends and reads fixed-width [`RawHeader`] records. Because every record
//! has the same size, skipping to logical position `n` is a single seek.

use std::io::SeekFrom;

use eventvault_core::MAX_EVENT_TYPE_LENGTH;
use futures::stream::BoxStream;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace};

use crate::error::StorageError;
use crate::extent::ExtentInfo;
use crate::io::{boxed, check_cancelled, open_existing};
use crate::raw_header::{RAW_HEADER_SIZE, RawHeader};

/// Lazy, finite sequence of header records
pub type HeaderStream = BoxStream<'static, Result<RawHeader, StorageError>>;

/// Reads and appends a stream's headers file
#[derive(Debug, Clone, Default)]
pub struct HeaderRepository {
    sync_on_write: bool,
}

impl HeaderRepository {
    pub fn new(sync_on_write: bool) -> Self {
        Self { sync_on_write }
    }

    /// Append records in order, one buffered write per record
    ///
    /// Cancellation is observed between records; records already written
    /// stay written.
    #[instrument(skip_all, fields(stream = %extent.stream_id, count = headers.len()))]
    pub async fn append(
        &self,
        extent: &ExtentInfo,
        headers: &[RawHeader],
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&extent.headers_path)
            .await?;
        let mut writer = BufWriter::new(file);

        for header in headers {
            if cancel.is_cancelled() {
                writer.flush().await?;
                return Err(StorageError::Cancelled);
            }
            writer.write_all(&header.encode()).await?;
        }

        writer.flush().await?;
        if self.sync_on_write {
            writer.get_ref().sync_data().await?;
        }
        trace!("Appended headers");
        Ok(())
    }

    /// Read up to `take` records starting at record `skip`
    ///
    /// The record count is fixed when the file is opened, so records appended
    /// during the read are not observed and a torn trailing record is ignored.
    /// A missing file yields an empty sequence.
    pub fn read(
        &self,
        extent: &ExtentInfo,
        skip: Option<u64>,
        take: Option<u64>,
        cancel: CancellationToken,
    ) -> HeaderStream {
        let path = extent.headers_path.clone();

        boxed(async_stream::try_stream! {
            if let Some(mut file) = open_existing(&path).await? {
                let total = file.metadata().await?.len() / RAW_HEADER_SIZE as u64;
                let start = skip.unwrap_or(0);
                let end = match take {
                    Some(take) => start.saturating_add(take).min(total),
                    None => total,
                };

                if start < end {
                    file.seek(SeekFrom::Start(start * RAW_HEADER_SIZE as u64)).await?;
                    let mut reader = BufReader::new(file);
                    let mut buf = [0u8; RAW_HEADER_SIZE];

                    for _ in start..end {
                        check_cancelled(&cancel)?;
                        reader.read_exact(&mut buf).await?;
                        let header = RawHeader::decode(&buf);
                        header.validate(MAX_EVENT_TYPE_LENGTH)?;
                        yield header;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extent::ExtentLayout;
    use eventvault_core::{StreamId, StreamType};
    use futures::StreamExt;
    use tempfile::TempDir;

    fn header(i: i64) -> RawHeader {
        RawHeader {
            id_timestamp: 1000 + i,
            id_sequence: 0,
            type_length: 4,
            data_offset: i * 100,
            data_length: 36,
        }
    }

    async fn setup() -> (ExtentInfo, TempDir) {
        let temp = TempDir::new().unwrap();
        let layout = ExtentLayout::new(temp.path());
        let id = StreamId::random(StreamType::new("orders").unwrap());
        let extent = layout.get_extent_info(&id, true).await.unwrap().unwrap();
        (extent, temp)
    }

    async fn collect(stream: HeaderStream) -> Vec<RawHeader> {
        stream.map(|h| h.unwrap()).collect().await
    }

    #[tokio::test]
    async fn test_append_and_read_all() {
        let (extent, _temp) = setup().await;
        let repo = HeaderRepository::default();
        let cancel = CancellationToken::new();

        let headers: Vec<_> = (0..10).map(header).collect();
        repo.append(&extent, &headers[..4], &cancel).await.unwrap();
        repo.append(&extent, &headers[4..], &cancel).await.unwrap();

        let len = tokio::fs::metadata(&extent.headers_path).await.unwrap().len();
        assert_eq!(len, 10 * RAW_HEADER_SIZE as u64);

        let read = collect(repo.read(&extent, None, None, cancel)).await;
        assert_eq!(read, headers);
    }

    #[tokio::test]
    async fn test_read_skip_and_take() {
        let (extent, _temp) = setup().await;
        let repo = HeaderRepository::default();
        let cancel = CancellationToken::new();
        let headers: Vec<_> = (0..10).map(header).collect();
        repo.append(&extent, &headers, &cancel).await.unwrap();

        let page = collect(repo.read(&extent, Some(3), Some(4), cancel.clone())).await;
        assert_eq!(page, headers[3..7].to_vec());

        let tail = collect(repo.read(&extent, Some(8), Some(100), cancel.clone())).await;
        assert_eq!(tail, headers[8..].to_vec());

        let past_end = collect(repo.read(&extent, Some(10), None, cancel.clone())).await;
        assert!(past_end.is_empty());

        let none = collect(repo.read(&extent, Some(0), Some(0), cancel)).await;
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_read_missing_file_is_empty() {
        let (extent, _temp) = setup().await;
        let repo = HeaderRepository::default();
        let read = collect(repo.read(&extent, None, None, CancellationToken::new())).await;
        assert!(read.is_empty());
    }

    #[tokio::test]
    async fn test_torn_trailing_record_is_ignored() {
        let (extent, _temp) = setup().await;
        let repo = HeaderRepository::default();
        let cancel = CancellationToken::new();
        let headers: Vec<_> = (0..3).map(header).collect();
        repo.append(&extent, &headers, &cancel).await.unwrap();

        let mut file = OpenOptions::new()
            .append(true)
            .open(&extent.headers_path)
            .await
            .unwrap();
        file.write_all(&[0xFF; 7]).await.unwrap();
        file.flush().await.unwrap();

        let read = collect(repo.read(&extent, None, None, cancel)).await;
        assert_eq!(read, headers);
    }

    #[tokio::test]
    async fn test_cancelled_read_errors() {
        let (extent, _temp) = setup().await;
        let repo = HeaderRepository::default();
        let cancel = CancellationToken::new();
        let headers: Vec<_> = (0..3).map(header).collect();
        repo.append(&extent, &headers, &cancel).await.unwrap();

        cancel.cancel();
        let mut stream = repo.read(&extent, None, None, cancel);
        let first = stream.next().await.unwrap();
        assert!(matches!(first, Err(StorageError::Cancelled)));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_append_writes_nothing() {
        let (extent, _temp) = setup().await;
        let repo = HeaderRepository::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = repo.append(&extent, &[header(0)], &cancel).await.unwrap_err();
        assert!(matches!(err, StorageError::Cancelled));
        let len = tokio::fs::metadata(&extent.headers_path).await.unwrap().len();
        assert_eq!(len, 0);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_reported() {
        let (extent, _temp) = setup().await;
        let repo = HeaderRepository::default();
        let cancel = CancellationToken::new();
        let bad = RawHeader {
            type_length: -1,
            ..header(0)
        };
        repo.append(&extent, &[bad], &cancel).await.unwrap();

        let mut stream = repo.read(&extent, None, None, cancel);
        assert!(matches!(stream.next().await, Some(Err(StorageError::Corrupt(_)))));
    }
}
