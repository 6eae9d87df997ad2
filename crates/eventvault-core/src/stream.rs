//! Stream identifiers
//!
//! A stream is addressed by a UUID key scoped by a [`StreamType`]. The type
//! doubles as the on-disk directory name, so it is validated on construction.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Maximum length of a stream type in bytes
pub const MAX_STREAM_TYPE_LENGTH: usize = 64;

/// Category of a stream, e.g. `orders` or `user-sessions`
///
/// Non-empty, at most [`MAX_STREAM_TYPE_LENGTH`] bytes, ASCII alphanumerics
/// plus `-`, `_` and `.`, and never starting with `.`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StreamType(String);

impl StreamType {
    /// Validate and wrap a stream type
    pub fn new(value: impl Into<String>) -> Result<Self, StoreError> {
        let value = value.into();
        Self::validate(&value)?;
        Ok(Self(value))
    }

    fn validate(value: &str) -> Result<(), StoreError> {
        if value.is_empty() {
            return Err(StoreError::bad_request("stream type must not be empty"));
        }
        if value.len() > MAX_STREAM_TYPE_LENGTH {
            return Err(StoreError::bad_request(format!(
                "stream type exceeds {} bytes",
                MAX_STREAM_TYPE_LENGTH
            )));
        }
        if value.starts_with('.') {
            return Err(StoreError::bad_request("stream type must not start with '.'"));
        }
        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(StoreError::bad_request(format!(
                "stream type contains invalid character {:?}",
                c
            )));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StreamType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for StreamType {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StreamType> for String {
    fn from(value: StreamType) -> Self {
        value.0
    }
}

impl AsRef<str> for StreamType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identity of a stream
///
/// Two streams with the same key but different types are distinct.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId {
    /// Stream key
    pub key: Uuid,
    /// Stream category
    pub stream_type: StreamType,
}

impl StreamId {
    /// Create a new stream id
    pub fn new(key: Uuid, stream_type: StreamType) -> Self {
        Self { key, stream_type }
    }

    /// Create a stream id with a fresh random key
    pub fn random(stream_type: StreamType) -> Self {
        Self::new(Uuid::new_v4(), stream_type)
    }

    /// The key as 32 lowercase hex characters, used as the extent file stem
    pub fn key_hex(&self) -> String {
        self.key.simple().to_string()
    }
}

impl Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stream_type, self.key.simple())
    }
}
