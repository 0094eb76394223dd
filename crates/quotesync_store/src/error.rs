//! Error types for store operations.

use quotesync_protocol::ItemId;
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A snapshot could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The persistence backend refused the save.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// An id is already present in the store, or twice in a snapshot.
    #[error("duplicate item id: {0}")]
    DuplicateId(ItemId),

    /// The snapshot was computed from an older version of the store.
    #[error("stale snapshot: based on version {based_on}, store is at version {current}")]
    StaleSnapshot {
        /// Version the snapshot was computed from.
        based_on: u64,
        /// Current store version.
        current: u64,
    },
}

impl StoreError {
    /// Returns true if the error came from the persistence layer.
    ///
    /// These never abort an in-memory mutation.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            StoreError::Io(_) | StoreError::Serialization(_) | StoreError::Persistence(_)
        )
    }
}
