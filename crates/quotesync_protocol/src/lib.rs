//! # QuoteSync Protocol
//!
//! Value types and pure sync logic for QuoteSync.
//!
//! This crate provides:
//! - [`Item`] and [`Snapshot`], the records being synchronized
//! - [`detect`] for classifying a local snapshot against a remote one
//! - [`resolve`] for collapsing a [`Conflict`] with a [`Strategy`]
//!
//! This is a pure crate with no I/O operations. Everything here works on
//! snapshots by value, which is what lets the engine test conflict handling
//! without a network.
//!
//! ## Example
//!
//! ```rust
//! use quotesync_protocol::{detect, resolve, ConflictOutcome, Item, Payload, Snapshot, Strategy};
//!
//! let local = Snapshot::new(vec![Item::remote("1", Payload::new("A", "Life"))], 1);
//! let remote = Snapshot::new(vec![Item::remote("1", Payload::new("B", "Life"))], 2);
//!
//! let ConflictOutcome::Conflict(conflict) = detect(&local, &remote) else {
//!     panic!("expected a conflict");
//! };
//! let resolved = resolve(&conflict, Strategy::ServerWins).unwrap();
//! assert_eq!(resolved.items[0].payload.text, "B");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod item;
mod resolution;
mod snapshot;

pub use conflict::{detect, Conflict, ConflictOutcome, ModifiedItem};
pub use item::{now_millis, Item, ItemDraft, ItemId, ItemStatus, OriginTag, Payload, PayloadField};
pub use resolution::{auto_resolve, resolve, ResolveError, Strategy};
pub use snapshot::Snapshot;
