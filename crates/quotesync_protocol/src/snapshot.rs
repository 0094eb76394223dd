//! Versioned views of the item collection.

use crate::item::{now_millis, Item, ItemId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// An immutable, versioned view of the full item collection.
///
/// Snapshots compare by item set and version only. Item order and
/// `captured_at` are ignored, so two snapshots taken at different times of
/// the same state are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Items in display order.
    pub items: Vec<Item>,
    /// Local or remote version marker, depending on where the snapshot came from.
    pub version: u64,
    /// Milliseconds since the Unix epoch when the snapshot was taken.
    pub captured_at: u64,
}

impl Snapshot {
    /// Creates a snapshot captured now.
    pub fn new(items: Vec<Item>, version: u64) -> Self {
        Self {
            items,
            version,
            captured_at: now_millis(),
        }
    }

    /// Creates an empty snapshot at version 0.
    pub fn empty() -> Self {
        Self::new(Vec::new(), 0)
    }

    /// Returns the number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if there are no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Looks up an item by id.
    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.items.iter().find(|item| &item.id == id)
    }

    /// Returns true if an item with this id exists.
    pub fn contains(&self, id: &ItemId) -> bool {
        self.get(id).is_some()
    }

    /// Returns the set of ids.
    pub fn id_set(&self) -> BTreeSet<ItemId> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }

    /// Builds an id → item index.
    pub fn index(&self) -> HashMap<&ItemId, &Item> {
        self.items.iter().map(|item| (&item.id, item)).collect()
    }

    /// Returns the first id that appears more than once, if any.
    pub fn duplicate_id(&self) -> Option<&ItemId> {
        let mut seen = HashSet::with_capacity(self.items.len());
        self.items
            .iter()
            .map(|item| &item.id)
            .find(|id| !seen.insert(*id))
    }

    fn sorted_items(&self) -> Vec<&Item> {
        let mut items: Vec<&Item> = self.items.iter().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.sorted_items() == other.sorted_items()
    }
}

impl Eq for Snapshot {}
