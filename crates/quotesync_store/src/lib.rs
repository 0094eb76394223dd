//! # QuoteSync Store
//!
//! The authoritative local collection of quotes and its persistence.
//!
//! ## Design Principles
//!
//! - [`RecordStore`] is the only owner of the local collection
//! - Every mutation goes through [`RecordStore::insert`] or [`RecordStore::apply`],
//!   which is what keeps the version counter meaningful
//! - Persistence backends are dumb snapshot stores; a failed save never
//!   rolls back an in-memory mutation
//!
//! ## Available Backends
//!
//! - [`InMemoryPersistence`] - For testing and ephemeral stores
//! - [`JsonFilePersistence`] - Pretty-printed JSON on disk
//!
//! ## Example
//!
//! ```rust
//! use quotesync_protocol::{ItemDraft, Payload};
//! use quotesync_store::{InMemoryPersistence, RecordStore};
//! use std::sync::Arc;
//!
//! let store = RecordStore::open(Arc::new(InMemoryPersistence::new())).unwrap();
//! let commit = store
//!     .insert(ItemDraft::new(Payload::new("Knowledge is power.", "Education")))
//!     .unwrap();
//! assert_eq!(commit.snapshot.version, 1);
//! assert_eq!(store.categories(), vec!["Education".to_string()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod persistence;
mod store;

pub use error::{StoreError, StoreResult};
pub use file::JsonFilePersistence;
pub use memory::InMemoryPersistence;
pub use persistence::Persistence;
pub use store::{Commit, RecordStore};
