//! # EventVault Core
//!
//! Core types, errors, and collaborator traits for the EventVault event store.
//!
//! This crate holds everything the storage pipeline and its consumers agree
//! on, without any I/O of its own:
//!
//! ## Key Types
//!
//! - [`StreamId`]: A stream's identity, a UUID key scoped by a [`StreamType`]
//! - [`EventId`]: Totally ordered event identifier (ticks, then tie-break sequence)
//! - [`Event`]: An immutable, identified event with a binary payload
//! - [`NewEvent`]: A client-supplied event before an id is assigned
//! - [`OperationResult`]: The transport-facing success/failure shape with stable codes
//!
//! ## Key Traits
//!
//! - [`EventsReader`]: Paged forward/backward reads
//! - [`EventsWriter`]: Appends with optional optimistic concurrency
//! - [`StreamInfoProvider`]: Stream catalogue and deletion
//! - [`Clock`]: Time source for id generation
//!
//! [`KeyedLocks`] is the per-key async mutex map shared by the persistence
//! and cache layers.

pub mod error;
pub mod event;
pub mod keyed_lock;
pub mod stream;
pub mod traits;

pub use error::*;
pub use event::*;
pub use keyed_lock::*;
pub use stream::*;
pub use traits::*;
