//! Conflict detection.

use crate::item::{Item, ItemId, PayloadField};
use crate::snapshot::Snapshot;

/// A shared id whose payload differs between local and remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifiedItem {
    /// The local version.
    pub local: Item,
    /// The remote version.
    pub remote: Item,
    /// Payload fields that differ.
    pub fields: Vec<PayloadField>,
}

impl ModifiedItem {
    /// Returns the shared id.
    pub fn id(&self) -> &ItemId {
        &self.local.id
    }
}

/// A detected divergence between a local and a remote snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Local state at detection time.
    pub local: Snapshot,
    /// Remote state at detection time.
    pub remote: Snapshot,
    /// Items present remotely, absent locally.
    pub added_remote: Vec<Item>,
    /// Items present locally, absent remotely.
    pub added_local: Vec<Item>,
    /// Shared ids with differing payloads.
    pub modified: Vec<ModifiedItem>,
}

impl Conflict {
    /// Local-only items the server acknowledged but did not return.
    pub fn unconfirmed_local(&self) -> impl Iterator<Item = &Item> {
        self.added_local
            .iter()
            .filter(|item| item.status.is_unconfirmed())
    }

    /// Total number of per-item deltas.
    pub fn delta_count(&self) -> usize {
        self.added_remote.len() + self.added_local.len() + self.modified.len()
    }
}

/// Relationship between a local and a remote snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictOutcome {
    /// No item-level differences.
    NoConflict,
    /// The remote only adds new ids; safe to apply without asking anyone.
    CleanMerge {
        /// Items to add locally.
        added_remote: Vec<Item>,
    },
    /// Genuine divergence that needs a strategy.
    Conflict(Conflict),
}

impl ConflictOutcome {
    /// Returns true for [`ConflictOutcome::Conflict`].
    pub fn is_conflict(&self) -> bool {
        matches!(self, ConflictOutcome::Conflict(_))
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ConflictOutcome::NoConflict => "no_conflict",
            ConflictOutcome::CleanMerge { .. } => "clean_merge",
            ConflictOutcome::Conflict(_) => "conflict",
        }
    }
}

/// Classifies `remote` against `local`.
///
/// Items sharing an id are the same only when every payload field matches
/// byte-for-byte. Among local-only items, `Pending` ones are upload
/// candidates and `Synced` ones are kept as they are; neither causes a
/// conflict. An `Uploaded` one does: the server acknowledged it and then did
/// not return it.
///
/// Versions do not take part in classification. A remote snapshot with a
/// newer version and identical items is `NoConflict`; the caller records the
/// new version.
pub fn detect(local: &Snapshot, remote: &Snapshot) -> ConflictOutcome {
    let local_index = local.index();
    let remote_index = remote.index();

    let added_remote: Vec<Item> = remote
        .items
        .iter()
        .filter(|item| !local_index.contains_key(&item.id))
        .cloned()
        .collect();

    let mut added_local = Vec::new();
    let mut modified = Vec::new();
    for item in &local.items {
        match remote_index.get(&item.id) {
            None => added_local.push(item.clone()),
            Some(remote_item) if !item.same_content(remote_item) => {
                modified.push(ModifiedItem {
                    fields: item.payload.differing_fields(&remote_item.payload),
                    local: item.clone(),
                    remote: (*remote_item).clone(),
                });
            }
            Some(_) => {}
        }
    }

    let unconfirmed = added_local
        .iter()
        .any(|item| item.status.is_unconfirmed());

    if modified.is_empty() && !unconfirmed {
        if added_remote.is_empty() {
            ConflictOutcome::NoConflict
        } else {
            ConflictOutcome::CleanMerge { added_remote }
        }
    } else {
        ConflictOutcome::Conflict(Conflict {
            local: local.clone(),
            remote: remote.clone(),
            added_remote,
            added_local,
            modified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ItemStatus, Payload};

    fn remote(id: &str, text: &str) -> Item {
        Item::remote(id, Payload::new(text, "Life"))
    }

    fn local(id: &str, text: &str) -> Item {
        Item::local(id, Payload::new(text, "Life"))
    }

    #[test]
    fn identical_snapshots_do_not_conflict() {
        let snapshot = Snapshot::new(vec![remote("1", "A"), remote("2", "B")], 4);
        assert_eq!(detect(&snapshot, &snapshot), ConflictOutcome::NoConflict);
    }

    #[test]
    fn newer_remote_version_without_changes_is_no_conflict() {
        let local_snap = Snapshot::new(vec![remote("1", "A")], 1);
        let remote_snap = Snapshot::new(vec![remote("1", "A")], 9);
        assert_eq!(detect(&local_snap, &remote_snap), ConflictOutcome::NoConflict);
    }

    #[test]
    fn remote_additions_are_a_clean_merge() {
        let local_snap = Snapshot::new(vec![remote("1", "A")], 1);
        let remote_snap = Snapshot::new(vec![remote("1", "A"), remote("2", "B")], 2);

        match detect(&local_snap, &remote_snap) {
            ConflictOutcome::CleanMerge { added_remote } => {
                assert_eq!(added_remote.len(), 1);
                assert_eq!(added_remote[0].id.as_str(), "2");
            }
            other => panic!("expected clean merge, got {other:?}"),
        }
    }

    #[test]
    fn differing_payload_is_a_conflict() {
        let local_snap = Snapshot::new(vec![remote("1", "A")], 1);
        let remote_snap = Snapshot::new(vec![remote("1", "B")], 2);

        let ConflictOutcome::Conflict(conflict) = detect(&local_snap, &remote_snap) else {
            panic!("expected conflict");
        };
        assert_eq!(conflict.modified.len(), 1);
        assert_eq!(conflict.modified[0].id().as_str(), "1");
        assert_eq!(conflict.modified[0].fields, vec![PayloadField::Text]);
        assert!(conflict.added_remote.is_empty());
    }

    #[test]
    fn category_change_alone_is_a_conflict() {
        let local_snap = Snapshot::new(vec![remote("1", "A")], 1);
        let changed = Item::remote("1", Payload::new("A", "Motivation"));
        let remote_snap = Snapshot::new(vec![changed], 2);

        let ConflictOutcome::Conflict(conflict) = detect(&local_snap, &remote_snap) else {
            panic!("expected conflict");
        };
        assert_eq!(conflict.modified[0].fields, vec![PayloadField::Category]);
    }

    #[test]
    fn pending_local_items_are_not_conflicts() {
        let local_snap = Snapshot::new(vec![remote("1", "A"), local("new", "N")], 2);
        let remote_snap = Snapshot::new(vec![remote("1", "A")], 1);
        assert_eq!(detect(&local_snap, &remote_snap), ConflictOutcome::NoConflict);
    }

    #[test]
    fn unconfirmed_upload_is_a_conflict() {
        let uploaded = local("u", "U").with_status(ItemStatus::Uploaded);
        let local_snap = Snapshot::new(vec![remote("1", "A"), uploaded], 2);
        let remote_snap = Snapshot::new(vec![remote("1", "A")], 1);

        let ConflictOutcome::Conflict(conflict) = detect(&local_snap, &remote_snap) else {
            panic!("expected conflict");
        };
        assert!(conflict.modified.is_empty());
        assert_eq!(conflict.unconfirmed_local().count(), 1);
        assert_eq!(conflict.delta_count(), 1);
    }

    #[test]
    fn synced_item_missing_remotely_is_a_clean_merge() {
        let kept = remote("a", "A");
        let local_snap = Snapshot::new(vec![kept], 3);
        let remote_snap = Snapshot::new(vec![remote("b", "B")], 4);

        match detect(&local_snap, &remote_snap) {
            ConflictOutcome::CleanMerge { added_remote } => {
                assert_eq!(added_remote.len(), 1);
                assert_eq!(added_remote[0].id.as_str(), "b");
            }
            other => panic!("expected clean merge, got {other:?}"),
        }
    }

    #[test]
    fn outcome_names() {
        assert_eq!(ConflictOutcome::NoConflict.name(), "no_conflict");
        assert!(!ConflictOutcome::NoConflict.is_conflict());
        let clean = ConflictOutcome::CleanMerge {
            added_remote: Vec::new(),
        };
        assert_eq!(clean.name(), "clean_merge");
    }
}
