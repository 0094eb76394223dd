//! The record store.

use crate::error::{StoreError, StoreResult};
use crate::persistence::Persistence;
use parking_lot::{Mutex, RwLock};
use quotesync_protocol::{Item, ItemDraft, Snapshot};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a successful [`RecordStore::insert`] or [`RecordStore::apply`].
#[derive(Debug)]
pub struct Commit {
    /// The snapshot now held by the store.
    pub snapshot: Snapshot,
    /// Set if the snapshot could not be persisted.
    ///
    /// The mutation still happened; the save is retried on the next mutation
    /// or [`RecordStore::flush`].
    pub persist_error: Option<StoreError>,
}

impl Commit {
    /// Returns true if the snapshot reached the persistence backend.
    pub fn is_persisted(&self) -> bool {
        self.persist_error.is_none()
    }
}

#[derive(Debug, Default)]
struct WriterState {
    /// The in-memory snapshot is newer than the persisted one.
    dirty: bool,
}

/// Authoritative local collection of quotes.
///
/// # Invariants
///
/// - Ids are unique at all times
/// - `version` grows by exactly one per successful `insert` or `apply`
/// - `apply` replaces the whole collection or nothing
///
/// Mutations are serialized by an internal writer lock, and `apply` only
/// succeeds if the snapshot was computed from the current version. A UI
/// `insert` racing a sync cycle therefore makes the cycle's `apply` fail
/// with [`StoreError::StaleSnapshot`] instead of silently dropping the insert.
pub struct RecordStore {
    current: RwLock<Snapshot>,
    writer: Mutex<WriterState>,
    persistence: Arc<dyn Persistence>,
}

impl RecordStore {
    /// Opens a store from the last snapshot saved in `persistence`.
    ///
    /// An empty backend yields an empty store at version 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the saved snapshot cannot be loaded or contains
    /// duplicate ids.
    pub fn open(persistence: Arc<dyn Persistence>) -> StoreResult<Self> {
        let snapshot = persistence.load()?.unwrap_or_default();
        if let Some(id) = snapshot.duplicate_id() {
            return Err(StoreError::DuplicateId(id.clone()));
        }
        info!(
            items = snapshot.len(),
            version = snapshot.version,
            "opened record store"
        );
        Ok(Self::from_parts(snapshot, persistence))
    }

    /// Opens a store, seeding it with `seed` if nothing was saved yet.
    ///
    /// The seeded collection is persisted immediately as version 1.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails or the seed contains duplicate ids.
    pub fn open_or_seed(
        persistence: Arc<dyn Persistence>,
        seed: impl IntoIterator<Item = ItemDraft>,
    ) -> StoreResult<Self> {
        if persistence.load()?.is_some() {
            return Self::open(persistence);
        }

        let items: Vec<Item> = seed.into_iter().map(ItemDraft::into_item).collect();
        let snapshot = Snapshot::new(items, 1);
        if let Some(id) = snapshot.duplicate_id() {
            return Err(StoreError::DuplicateId(id.clone()));
        }
        info!(items = snapshot.len(), "seeding empty record store");

        let store = Self::from_parts(snapshot.clone(), persistence);
        store.persist(&mut store.writer.lock(), &snapshot);
        Ok(store)
    }

    fn from_parts(snapshot: Snapshot, persistence: Arc<dyn Persistence>) -> Self {
        Self {
            current: RwLock::new(snapshot),
            writer: Mutex::new(WriterState::default()),
            persistence,
        }
    }

    /// Returns the present local state.
    pub fn current(&self) -> Snapshot {
        self.current.read().clone()
    }

    /// Returns the current local version.
    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    /// Returns the number of items.
    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    /// Returns true if the store holds no items.
    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    /// Returns true if the latest snapshot has not been persisted yet.
    pub fn is_dirty(&self) -> bool {
        self.writer.lock().dirty
    }

    /// Returns the distinct categories in first-seen order.
    pub fn categories(&self) -> Vec<String> {
        let current = self.current.read();
        let mut categories: Vec<String> = Vec::new();
        for item in &current.items {
            if !categories.contains(&item.payload.category) {
                categories.push(item.payload.category.clone());
            }
        }
        categories
    }

    /// Returns the items in `category`.
    pub fn by_category(&self, category: &str) -> Vec<Item> {
        self.current
            .read()
            .items
            .iter()
            .filter(|item| item.payload.category == category)
            .cloned()
            .collect()
    }

    /// Appends a locally originated item and bumps the version.
    ///
    /// A fresh id is generated when the draft has none. A persistence
    /// failure does not fail the insert: it is reported in
    /// [`Commit::persist_error`] and retried later.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateId`] if the draft's id is taken.
    pub fn insert(&self, draft: ItemDraft) -> StoreResult<Commit> {
        let mut writer = self.writer.lock();
        let base = self.current();

        let item = draft.into_item();
        if base.contains(&item.id) {
            return Err(StoreError::DuplicateId(item.id));
        }
        debug!(id = %item.id, version = base.version + 1, "inserting item");

        let mut items = base.items;
        items.push(item);
        let next = Snapshot::new(items, base.version + 1);

        *self.current.write() = next.clone();
        let persist_error = self.persist(&mut writer, &next);
        Ok(Commit {
            snapshot: next,
            persist_error,
        })
    }

    /// Atomically replaces the collection with `resolved` and bumps the version.
    ///
    /// `resolved.version` must be the version the resolution was computed
    /// from, i.e. the current version of the store.
    ///
    /// # Errors
    ///
    /// - [`StoreError::StaleSnapshot`] if the store moved on since
    /// - [`StoreError::DuplicateId`] if `resolved` repeats an id
    ///
    /// Nothing changes when an error is returned.
    pub fn apply(&self, resolved: Snapshot) -> StoreResult<Commit> {
        let mut writer = self.writer.lock();
        let current_version = self.version();

        if resolved.version != current_version {
            return Err(StoreError::StaleSnapshot {
                based_on: resolved.version,
                current: current_version,
            });
        }
        if let Some(id) = resolved.duplicate_id() {
            return Err(StoreError::DuplicateId(id.clone()));
        }

        let next = Snapshot::new(resolved.items, current_version + 1);
        debug!(
            items = next.len(),
            version = next.version,
            "applying resolved snapshot"
        );

        *self.current.write() = next.clone();
        let persist_error = self.persist(&mut writer, &next);
        Ok(Commit {
            snapshot: next,
            persist_error,
        })
    }

    /// Retries a save that failed earlier. No-op when nothing is pending.
    ///
    /// # Errors
    ///
    /// Returns the persistence error if the save fails again.
    pub fn flush(&self) -> StoreResult<()> {
        let mut writer = self.writer.lock();
        if !writer.dirty {
            return Ok(());
        }
        let snapshot = self.current();
        self.persistence.save(&snapshot)?;
        writer.dirty = false;
        Ok(())
    }

    fn persist(&self, writer: &mut WriterState, snapshot: &Snapshot) -> Option<StoreError> {
        match self.persistence.save(snapshot) {
            Ok(()) => {
                writer.dirty = false;
                None
            }
            Err(e) => {
                warn!(
                    version = snapshot.version,
                    error = %e,
                    "failed to persist snapshot; keeping it in memory"
                );
                writer.dirty = true;
                Some(e)
            }
        }
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let current = self.current.read();
        f.debug_struct("RecordStore")
            .field("items", &current.len())
            .field("version", &current.version)
            .finish()
    }
}
