//! Extent layout
//!
//! Maps streams to the pair of files backing them:
//!
//! ```text
//! <base_dir>/<stream_type>/<key_hex32>_0_headers.dat
//! <base_dir>/<stream_type>/<key_hex32>_0_data.dat
//! ```
//!
//! There is no catalogue file. The set of streams is rediscovered by scanning
//! type directories for headers files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eventvault_core::{StreamId, StreamType};
use tokio::fs;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::StorageError;
use crate::raw_header::RAW_HEADER_SIZE;

/// Extent number used for every stream until segment rotation exists
pub const CURRENT_EXTENT: u32 = 0;

const HEADERS_SUFFIX: &str = "headers.dat";
const DATA_SUFFIX: &str = "data.dat";

/// The two files backing one stream extent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtentInfo {
    pub stream_id: StreamId,
    /// Reserved for segment rotation; always [`CURRENT_EXTENT`]
    pub extent_number: u32,
    pub headers_path: PathBuf,
    pub data_path: PathBuf,
}

/// Resolves extent paths under a base directory
#[derive(Debug, Clone)]
pub struct ExtentLayout {
    base_dir: PathBuf,
}

impl ExtentLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn type_dir(&self, stream_type: &StreamType) -> PathBuf {
        self.base_dir.join(stream_type.as_str())
    }

    /// Compute the extent paths for a stream without touching the filesystem
    pub fn extent_for(&self, stream_id: &StreamId) -> ExtentInfo {
        let dir = self.type_dir(&stream_id.stream_type);
        let stem = format!("{}_{}", stream_id.key_hex(), CURRENT_EXTENT);
        ExtentInfo {
            stream_id: stream_id.clone(),
            extent_number: CURRENT_EXTENT,
            headers_path: dir.join(format!("{stem}_{HEADERS_SUFFIX}")),
            data_path: dir.join(format!("{stem}_{DATA_SUFFIX}")),
        }
    }

    /// Resolve a stream's extent
    ///
    /// Returns `None` when the headers file does not exist and
    /// `create_if_missing` is false. Otherwise ensures the type directory
    /// exists and returns the paths.
    pub async fn get_extent_info(
        &self,
        stream_id: &StreamId,
        create_if_missing: bool,
    ) -> Result<Option<ExtentInfo>, StorageError> {
        let extent = self.extent_for(stream_id);
        if fs::try_exists(&extent.headers_path).await? {
            return Ok(Some(extent));
        }
        if !create_if_missing {
            return Ok(None);
        }
        fs::create_dir_all(self.type_dir(&stream_id.stream_type)).await?;
        Ok(Some(extent))
    }

    /// Enumerate one extent per stream found on disk
    ///
    /// Directories that are not valid stream types and files that do not
    /// follow the naming convention are ignored. Results are sorted by type,
    /// then key.
    pub async fn get_all_extents_info(
        &self,
        stream_type: Option<&StreamType>,
    ) -> Result<Vec<ExtentInfo>, StorageError> {
        let types = match stream_type {
            Some(t) => vec![t.clone()],
            None => self.discover_types().await?,
        };

        let mut extents = Vec::new();
        for stream_type in types {
            let dir = self.type_dir(&stream_type);
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                let Some(key) = name.to_str().and_then(Self::parse_headers_file_name) else {
                    continue;
                };
                extents.push(self.extent_for(&StreamId::new(key, stream_type.clone())));
            }
        }

        extents.sort_by(|a, b| a.stream_id.cmp(&b.stream_id));
        debug!(count = extents.len(), "Enumerated extents");
        Ok(extents)
    }

    async fn discover_types(&self) -> Result<Vec<StreamType>, StorageError> {
        let mut entries = match fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut types = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(stream_type) = entry
                .file_name()
                .to_str()
                .and_then(|name| StreamType::new(name).ok())
            {
                types.push(stream_type);
            }
        }
        Ok(types)
    }

    /// Extract the stream key from a `<key_hex32>_0_headers.dat` file name
    pub fn parse_headers_file_name(name: &str) -> Option<Uuid> {
        let stem = name.strip_suffix(&format!("_{CURRENT_EXTENT}_{HEADERS_SUFFIX}"))?;
        if stem.len() != 32 || !stem.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Uuid::parse_str(stem).ok()
    }

    /// Number of complete header records in an extent
    pub async fn stream_length(&self, extent: &ExtentInfo) -> Result<u64, StorageError> {
        match fs::metadata(&extent.headers_path).await {
            Ok(meta) => Ok(meta.len() / RAW_HEADER_SIZE as u64),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove both files of an extent, retrying on failure
    ///
    /// Missing files count as removed. A partial removal is not rolled back.
    #[instrument(skip(self, extent), fields(stream = %extent.stream_id))]
    pub async fn delete_extent(
        &self,
        extent: &ExtentInfo,
        attempts: u32,
        delay: Duration,
    ) -> Result<(), StorageError> {
        let attempts = attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let headers = remove_if_exists(&extent.headers_path).await;
            let data = remove_if_exists(&extent.data_path).await;
            match headers.and(data) {
                Ok(()) => {
                    debug!(attempt, "Deleted extent");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Failed to delete extent");
                    last_error = e.to_string();
                }
            }
            if attempt < attempts {
                tokio::time::sleep(delay).await;
            }
        }

        Err(StorageError::DeleteFailed {
            attempts,
            message: last_error,
        })
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
