//! Error types for the engine's lifecycle
//!
//! Request-level failures use [`eventvault_core::StoreError`]; this type only
//! covers opening and shutting down an [`EventStore`](crate::EventStore).

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(String),

    /// A background task panicked or was aborted
    #[error("background task failed: {0}")]
    Task(String),
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err.to_string())
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        EngineError::Task(err.to_string())
    }
}
