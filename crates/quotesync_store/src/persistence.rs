//! Persistence collaborator trait.

use crate::error::StoreResult;
use quotesync_protocol::Snapshot;

/// Durable home for the record store's latest snapshot.
///
/// Backends are **opaque snapshot stores**. They do not merge, validate or
/// version anything; the [`RecordStore`](crate::RecordStore) owns all of
/// that and always saves the full current snapshot.
///
/// # Invariants
///
/// - `load` returns the snapshot passed to the last successful `save`
/// - `save` replaces the previous snapshot as a whole or not at all
/// - Backends must be `Send + Sync`; the store calls them from whichever
///   thread performs the mutation
///
/// # Implementors
///
/// - [`super::InMemoryPersistence`] - For testing
/// - [`super::JsonFilePersistence`] - For persistent storage
pub trait Persistence: Send + Sync {
    /// Loads the last saved snapshot, or `None` if nothing was saved yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored data cannot be read or decoded.
    fn load(&self) -> StoreResult<Option<Snapshot>>;

    /// Saves `snapshot`, replacing whatever was stored before.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot could not be written.
    fn save(&self, snapshot: &Snapshot) -> StoreResult<()>;
}
