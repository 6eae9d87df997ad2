//! # EventVault Storage
//!
//! Extent-based on-disk persistence for EventVault streams.
//!
//! Every stream is backed by one extent: a headers file of fixed-width
//! records and a data file of variable-width records. Header record `n`
//! describes the event at logical position `n`, which makes positional reads
//! a single seek.
//!
//! ## Features
//!
//! - **ExtentLayout**: Stream to file-path mapping and on-disk discovery
//! - **RawHeader**: The 26-byte little-endian header record codec
//! - **HeaderRepository** / **DataRepository**: Append and lazy, cancellable reads
//! - **PersistenceCoordinator**: Per-stream serialized appends, paged reads and deletion
//!
//! ## Example
//!
//! ```rust,ignore
//! use eventvault_storage::{PersistenceConfig, PersistenceCoordinator};
//! use futures::StreamExt;
//!
//! let coordinator = PersistenceCoordinator::new(PersistenceConfig {
//!     base_dir: "./data/streams".into(),
//!     ..Default::default()
//! });
//! coordinator.append(&stream_id, &events, &cancel).await?;
//!
//! let mut page = coordinator.read(&stream_id, Some(100), Some(50), &cancel).await?;
//! while let Some(event) = page.next().await {
//!     println!("{}", event?.id);
//! }
//! ```

pub mod data_repository;
pub mod error;
pub mod extent;
pub mod header_repository;
mod io;
pub mod persistence;
pub mod raw_header;

// Re-exports
pub use data_repository::{DataRepository, EventRecordStream};
pub use error::StorageError;
pub use extent::{CURRENT_EXTENT, ExtentInfo, ExtentLayout};
pub use header_repository::{HeaderRepository, HeaderStream};
pub use persistence::{PersistenceConfig, PersistenceCoordinator};
pub use raw_header::{RAW_HEADER_SIZE, RawHeader};
