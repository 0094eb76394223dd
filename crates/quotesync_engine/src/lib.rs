//! # QuoteSync Engine
//!
//! Sync scheduler and remote boundary for QuoteSync.
//!
//! This crate provides:
//! - [`SyncEngine`], the single-flight state machine
//!   (idle → fetching → resolving → applying → idle, plus blocked)
//! - Retry with exponential backoff and a per-call timeout
//! - The [`RemoteFetcher`] boundary and a JSON [`HttpFetcher`] over any
//!   [`RemoteTransport`]
//! - Upload of pending local items, with server ids replacing local ones
//! - The [`ConflictPrompt`] collaborator for deferred conflicts
//!
//! ## Architecture
//!
//! Each cycle works on values:
//! 1. Fetch a remote [`Snapshot`](quotesync_protocol::Snapshot)
//! 2. Classify it against the store's current snapshot
//! 3. Resolve with the configured strategy, or block for the user
//! 4. Apply the result to the [`RecordStore`](quotesync_store::RecordStore)
//! 5. Upload items still pending
//!
//! ## Key Invariants
//!
//! - At most one cycle runs at a time; extra triggers are dropped
//! - While blocked, no cycle starts
//! - Every failure ends in idle or blocked, never in between
//! - `apply` only succeeds against the version the cycle read, so local
//!   inserts are never overwritten
//!
//! ## Example
//!
//! ```rust
//! use quotesync_engine::{HttpFetcher, MockTransport, RetryConfig, SyncConfig, SyncEngine};
//! use quotesync_protocol::Strategy;
//! use quotesync_store::{InMemoryPersistence, RecordStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store = Arc::new(RecordStore::open(Arc::new(InMemoryPersistence::new())).unwrap());
//! let transport = MockTransport::new();
//! transport.set_get_body(r#"[{"id": 1, "text": "Knowledge is power.", "category": "Education"}]"#);
//!
//! let config = SyncConfig::new(
//!     Duration::from_secs(30),
//!     Strategy::Merge,
//!     Duration::from_secs(5),
//!     RetryConfig::new(3),
//! );
//! let engine = SyncEngine::new(config, store.clone(), HttpFetcher::new(transport, "/quotes")).unwrap();
//!
//! engine.sync_now().await.unwrap();
//! assert_eq!(store.len(), 1);
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod fetcher;
mod prompt;
mod state;
mod transport;

pub use config::{RetryConfig, SyncConfig};
pub use engine::SyncEngine;
pub use error::{FetchError, SyncError, SyncResult};
pub use fetcher::{
    decode_collection, HttpFetcher, RemoteCollection, RemoteFetcher, UploadAck, WireAck, WireId,
    WireRecord,
};
pub use prompt::{ConflictPrompt, PromptDecision, RecordingPrompt};
pub use state::{
    CycleOutcome, CycleReport, OutcomeKind, SyncMetadata, SyncState, SyncStats, TriggerSource,
};
pub use transport::{MockTransport, RemoteTransport, TransportError};
