//! Error types for eventvault-storage
//!
//! This module defines the error types used throughout the storage crate.

use eventvault_core::StoreError;
use thiserror::Error;

/// Errors that can occur in storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error during storage operations
    #[error("I/O error: {0}")]
    Io(String),

    /// A record could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// File removal kept failing after all retries
    #[error("Delete failed after {attempts} attempts: {message}")]
    DeleteFailed { attempts: u32, message: String },

    /// The operation observed a cancellation request
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl StorageError {
    /// Create a new I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    /// Create a new Corrupt error
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt(message.into())
    }
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Cancelled => StoreError::Cancelled,
            other => StoreError::Storage(other.to_string()),
        }
    }
}
