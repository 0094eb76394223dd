//! Conflict resolution.

use crate::conflict::Conflict;
use crate::item::{Item, ItemStatus};
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from the resolution policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// `AskUser` only defers resolution; it cannot produce a snapshot.
    #[error("AskUser defers resolution; a concrete strategy is required")]
    DeferredStrategy,

    /// A strategy name could not be parsed.
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),
}

/// How a conflict is collapsed into a single snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Take the remote items verbatim.
    ServerWins,
    /// Keep the local items verbatim. Remote additions are dropped.
    LocalWins,
    /// Union by id; the remote payload wins on overlap.
    Merge,
    /// Hand the conflict to the user and wait.
    AskUser,
}

impl Strategy {
    /// Returns true if this strategy resolves without user input.
    pub fn auto_resolves(&self) -> bool {
        !matches!(self, Strategy::AskUser)
    }

    /// Returns the kebab-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::ServerWins => "server-wins",
            Strategy::LocalWins => "local-wins",
            Strategy::Merge => "merge",
            Strategy::AskUser => "ask-user",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "server-wins" | "server" => Ok(Strategy::ServerWins),
            "local-wins" | "local" => Ok(Strategy::LocalWins),
            "merge" => Ok(Strategy::Merge),
            "ask-user" | "ask" => Ok(Strategy::AskUser),
            _ => Err(ResolveError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Resolves `conflict` with `strategy`.
///
/// The returned snapshot carries the local snapshot's version, which the
/// record store checks before applying it.
///
/// # Errors
///
/// Returns [`ResolveError::DeferredStrategy`] for [`Strategy::AskUser`].
pub fn resolve(conflict: &Conflict, strategy: Strategy) -> Result<Snapshot, ResolveError> {
    let items = match strategy {
        Strategy::ServerWins => conflict.remote.items.clone(),
        Strategy::LocalWins => keep_local(&conflict.local, &conflict.remote),
        Strategy::Merge => merge(&conflict.local, &conflict.remote),
        Strategy::AskUser => return Err(ResolveError::DeferredStrategy),
    };
    Ok(Snapshot::new(items, conflict.local.version))
}

/// Resolution for outcomes that need no strategy (no conflict, clean merge).
///
/// Adds remote-only items and promotes uploaded items the server now returns
/// to `Synced`. Same rules as [`Strategy::Merge`].
pub fn auto_resolve(local: &Snapshot, remote: &Snapshot) -> Snapshot {
    Snapshot::new(merge(local, remote), local.version)
}

fn merge(local: &Snapshot, remote: &Snapshot) -> Vec<Item> {
    let remote_index = remote.index();
    let mut seen = HashSet::with_capacity(local.len() + remote.len());
    let mut items = Vec::with_capacity(local.len() + remote.len());

    for item in &local.items {
        seen.insert(&item.id);
        match remote_index.get(&item.id) {
            Some(remote_item) => items.push((*remote_item).clone()),
            None => items.push(requeue(item)),
        }
    }
    for item in &remote.items {
        if seen.insert(&item.id) {
            items.push(item.clone());
        }
    }
    items
}

fn keep_local(local: &Snapshot, remote: &Snapshot) -> Vec<Item> {
    let remote_index = remote.index();
    local
        .items
        .iter()
        .map(|item| match remote_index.get(&item.id) {
            Some(remote_item) if item.same_content(remote_item) => {
                item.clone().with_status(ItemStatus::Synced)
            }
            // The server holds a different payload; push ours again.
            Some(_) => item.clone().with_status(ItemStatus::Pending),
            None => requeue(item),
        })
        .collect()
}

/// Uploaded items the server did not return go back to the upload queue.
fn requeue(item: &Item) -> Item {
    if item.status.is_unconfirmed() {
        item.clone().with_status(ItemStatus::Pending)
    } else {
        item.clone()
    }
}
