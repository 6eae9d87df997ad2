//! # EventVault Engine
//!
//! The cached, write-back event store built on EventVault extents.
//!
//! Appends are admitted to an in-memory, authoritative copy of the stream and
//! handed to a single background worker for persistence. Reads are served
//! from memory; a stream that is not resident is hydrated from disk once,
//! however many callers miss on it at the same time.
//!
//! ## Components
//!
//! - **EventStore**: Opens the pipeline, exposes it through the collaborator traits, shuts it down
//! - **StreamCache**: LRU of hydrated streams over [`LruCache`]
//! - **StreamReader** / **StreamWriter**: Paged reads and validated, version-checked appends
//! - **WriteBackWorker**: Drains the hand-off queue into the persistence coordinator
//! - **MemoryWatcher**: Evicts the oldest streams when the process exceeds its memory ceiling
//! - **StreamInfoService**: Stream catalogue and deletion
//!
//! ## Example
//!
//! ```rust,ignore
//! use eventvault_core::{NewEvent, ReadDirection, StreamId, StreamType, END};
//! use eventvault_engine::{EngineConfig, EventStore};
//! use futures::StreamExt;
//! use tokio_util::sync::CancellationToken;
//!
//! let store = EventStore::open(EngineConfig::with_data_dir("./data")).await?;
//! let cancel = CancellationToken::new();
//! let stream = StreamId::random(StreamType::new("orders")?);
//!
//! store
//!     .writer()
//!     .append(&stream, vec![NewEvent::new("placed", b"{}".to_vec())], Some(0), &cancel)
//!     .await?;
//!
//! let latest: Vec<_> = store
//!     .reader()
//!     .read(&stream, END, ReadDirection::Backward, &cancel)
//!     .await?
//!     .collect()
//!     .await;
//!
//! store.shutdown().await?;
//! ```

pub mod config;
pub mod error;
pub mod info_provider;
pub mod lru;
pub mod memory_watcher;
pub mod pending;
pub mod reader;
pub mod store;
pub mod stream_cache;
pub mod write_back;
pub mod writer;

pub use config::{ConfigError, EngineConfig};
pub use error::EngineError;
pub use info_provider::StreamInfoService;
pub use lru::{EvictionListener, LruCache, LruStats};
pub use memory_watcher::{MemoryProbe, MemoryWatcher, SysinfoProbe};
pub use pending::PendingWrites;
pub use reader::StreamReader;
pub use store::EventStore;
pub use stream_cache::{CachedEvents, StreamCache};
pub use write_back::{HandOff, HandOffRejection, IncomingEventsBatch, WriteBackReport, WriteBackWorker};
pub use writer::StreamWriter;
