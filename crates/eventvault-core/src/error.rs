//! Error types for EventVault
//!
//! [`StoreError`] is the client-facing error taxonomy. Every variant maps to
//! a stable numeric [`ErrorCode`] so transports can report failures without
//! knowing the Rust types.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by readers, writers and the stream info provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The request is malformed (bad stream type, oversized payload, negative position, ...)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Optimistic concurrency check failed
    #[error("Version mismatch: expected {expected}, actual {actual}")]
    VersionMismatch { expected: u64, actual: u64 },

    /// The hand-off channel rejected a batch
    #[error("Cannot initiate write: {0}")]
    CannotInitiateWrite(String),

    /// Reserved for client-supplied idempotency keys
    #[error("Duplicate event: {0}")]
    DuplicateEvent(String),

    /// The operation was cancelled before it completed
    #[error("Operation cancelled")]
    Cancelled,

    /// Underlying storage failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl StoreError {
    /// Create a new BadRequest error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Create a new CannotInitiateWrite error
    pub fn cannot_initiate_write(message: impl Into<String>) -> Self {
        Self::CannotInitiateWrite(message.into())
    }

    /// Create a new Storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// The stable numeric code reported for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::BadRequest(_) => ErrorCode::BadRequest,
            Self::VersionMismatch { .. } => ErrorCode::VersionMismatch,
            Self::CannotInitiateWrite(_) => ErrorCode::CannotInitiateWrite,
            Self::DuplicateEvent(_) => ErrorCode::DuplicateEvent,
            Self::Cancelled | Self::Storage(_) => ErrorCode::Unknown,
        }
    }

    /// Whether the client can fix the request and retry
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::BadRequest(_) | Self::VersionMismatch { .. })
    }
}

/// Stable failure codes shared with transports and client SDKs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    Unknown = -1,
    DuplicateEvent = -2,
    BadRequest = -3,
    CannotInitiateWrite = -4,
    VersionMismatch = -5,
}

impl ErrorCode {
    /// The numeric wire value
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Parse a numeric wire value
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            -1 => Some(Self::Unknown),
            -2 => Some(Self::DuplicateEvent),
            -3 => Some(Self::BadRequest),
            -4 => Some(Self::CannotInitiateWrite),
            -5 => Some(Self::VersionMismatch),
            _ => None,
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.as_i32())
    }
}

/// Outcome of a write or delete as seen by a transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationResult {
    Success,
    Failure { code: ErrorCode, message: String },
}

impl OperationResult {
    /// Build a failure result
    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Failure {
            code,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// The failure code, if any
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Success => None,
            Self::Failure { code, .. } => Some(*code),
        }
    }
}

impl From<StoreError> for OperationResult {
    fn from(err: StoreError) -> Self {
        Self::Failure {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl From<Result<(), StoreError>> for OperationResult {
    fn from(result: Result<(), StoreError>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(err) => err.into(),
        }
    }
}
