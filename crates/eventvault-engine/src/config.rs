//! Engine configuration
//!
//! Loaded from TOML; every field is optional and falls back to its default:
//!
//! ```toml
//! data_dir = "/var/lib/eventvault"
//! max_read_page_size = 100
//! max_cached_streams = 1000
//! max_process_memory_bytes = 2147483648
//! # write_queue_capacity = 10000   # unbounded when absent
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use eventvault_storage::PersistenceConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {message}")]
    Read { path: PathBuf, message: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for an [`EventStore`](crate::EventStore)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root folder holding one subdirectory per stream type
    pub data_dir: PathBuf,
    /// Largest page served to readers
    pub max_read_page_size: usize,
    /// Page size used when hydrating a stream from disk
    pub hydration_page_size: usize,
    /// Largest accepted event payload, in bytes
    pub max_event_size: usize,
    /// LRU capacity, in streams
    pub max_cached_streams: usize,
    /// Resident memory ceiling that triggers eviction
    pub max_process_memory_bytes: u64,
    /// Memory watcher sampling interval
    pub memory_check_interval_ms: u64,
    /// Share of cached streams dropped per pressure event
    pub eviction_fraction: f64,
    /// Hand-off channel bound; `None` is unbounded
    pub write_queue_capacity: Option<usize>,
    /// fsync after every write-back
    pub sync_on_write: bool,
    pub delete_retry_attempts: u32,
    pub delete_retry_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./eventvault-data"),
            max_read_page_size: 100,
            hydration_page_size: 1000,
            max_event_size: 1024 * 1024,
            max_cached_streams: 1000,
            max_process_memory_bytes: 2 * 1024 * 1024 * 1024,
            memory_check_interval_ms: 5000,
            eviction_fraction: 1.0 / 3.0,
            write_queue_capacity: None,
            sync_on_write: false,
            delete_retry_attempts: 3,
            delete_retry_delay_ms: 100,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with a custom data directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Set the reader page size
    pub fn with_max_read_page_size(mut self, size: usize) -> Self {
        self.max_read_page_size = size;
        self
    }

    /// Set the LRU capacity
    pub fn with_max_cached_streams(mut self, capacity: usize) -> Self {
        self.max_cached_streams = capacity;
        self
    }

    /// Bound the hand-off channel
    pub fn with_write_queue_capacity(mut self, capacity: usize) -> Self {
        self.write_queue_capacity = Some(capacity);
        self
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config = Self::from_toml_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("max_read_page_size", self.max_read_page_size as u64),
            ("hydration_page_size", self.hydration_page_size as u64),
            ("max_event_size", self.max_event_size as u64),
            ("max_cached_streams", self.max_cached_streams as u64),
            ("memory_check_interval_ms", self.memory_check_interval_ms),
            ("delete_retry_attempts", u64::from(self.delete_retry_attempts)),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
        }
        if !(self.eviction_fraction > 0.0 && self.eviction_fraction <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "eviction_fraction must be in (0, 1], got {}",
                self.eviction_fraction
            )));
        }
        if self.write_queue_capacity == Some(0) {
            return Err(ConfigError::Invalid(
                "write_queue_capacity must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn memory_check_interval(&self) -> Duration {
        Duration::from_millis(self.memory_check_interval_ms)
    }

    pub fn persistence(&self) -> PersistenceConfig {
        PersistenceConfig {
            base_dir: self.data_dir.clone(),
            sync_on_write: self.sync_on_write,
            delete_retry_attempts: self.delete_retry_attempts,
            delete_retry_delay: Duration::from_millis(self.delete_retry_delay_ms),
        }
    }
}
