//! In-memory persistence for testing.

use crate::error::{StoreError, StoreResult};
use crate::persistence::Persistence;
use parking_lot::RwLock;
use quotesync_protocol::Snapshot;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// An in-memory persistence backend.
///
/// Suitable for unit tests, integration tests and stores that do not need
/// to survive a restart. Saves can be made to fail on demand to exercise
/// the store's non-fatal persistence path.
///
/// # Example
///
/// ```rust
/// use quotesync_protocol::Snapshot;
/// use quotesync_store::{InMemoryPersistence, Persistence};
///
/// let persistence = InMemoryPersistence::new();
/// persistence.save(&Snapshot::empty()).unwrap();
/// assert_eq!(persistence.save_count(), 1);
/// assert!(persistence.load().unwrap().is_some());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    saved: RwLock<Option<Snapshot>>,
    save_count: AtomicU64,
    fail_saves: AtomicBool,
}

impl InMemoryPersistence {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that already holds `snapshot`.
    ///
    /// Useful for testing restarts.
    #[must_use]
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            saved: RwLock::new(Some(snapshot)),
            ..Self::default()
        }
    }

    /// Returns a copy of the saved snapshot.
    #[must_use]
    pub fn saved(&self) -> Option<Snapshot> {
        self.saved.read().clone()
    }

    /// Returns the number of successful saves.
    #[must_use]
    pub fn save_count(&self) -> u64 {
        self.save_count.load(Ordering::SeqCst)
    }

    /// Makes subsequent saves fail (or succeed again).
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl Persistence for InMemoryPersistence {
    fn load(&self) -> StoreResult<Option<Snapshot>> {
        Ok(self.saved.read().clone())
    }

    fn save(&self, snapshot: &Snapshot) -> StoreResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Persistence("in-memory save disabled".into()));
        }
        *self.saved.write() = Some(snapshot.clone());
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
