//! Scheduler states and the records the engine keeps about its cycles.

use quotesync_protocol::{Conflict, Strategy};
use std::fmt;
use std::time::{Duration, SystemTime};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    /// Engine is idle, waiting for a trigger.
    Idle,
    /// Engine is retrieving the remote snapshot (including retries).
    Fetching,
    /// Engine is classifying and resolving the remote snapshot.
    Resolving,
    /// Engine is writing the resolution to the store and uploading.
    Applying,
    /// A conflict awaits the user's decision; no cycle can start.
    Blocked,
}

impl SyncState {
    /// Returns true if a cycle is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Fetching | SyncState::Resolving | SyncState::Applying
        )
    }

    /// Returns true if the engine can start a new sync.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncState::Idle)
    }

    /// Returns the state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Fetching => "fetching",
            SyncState::Resolving => "resolving",
            SyncState::Applying => "applying",
            SyncState::Blocked => "blocked",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What asked for a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// The periodic auto-sync timer.
    Auto,
    /// An explicit "sync now" request.
    Manual,
}

/// How the remote snapshot related to the local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// No item-level differences.
    NoConflict,
    /// The remote only added items.
    CleanMerge,
    /// A conflict was resolved with a strategy.
    Conflict,
}

/// Summary of a completed cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Classification of the remote snapshot.
    pub kind: OutcomeKind,
    /// Strategy used, if a conflict had to be resolved.
    pub strategy: Option<Strategy>,
    /// Whether the store changed.
    pub applied: bool,
    /// Local version after the cycle.
    pub local_version: u64,
    /// Remote version seen by the cycle.
    pub remote_version: u64,
    /// Number of items the server acknowledged.
    pub uploaded: usize,
    /// Duration of the cycle.
    pub duration: Duration,
}

/// Result of a trigger or a prompt decision.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// The cycle ran to the end; the engine is idle again.
    Completed(CycleReport),
    /// A conflict was deferred to the user; the engine is blocked.
    Blocked,
    /// The pending conflict was discarded; the engine is idle.
    Discarded,
    /// The trigger was dropped because the engine was not idle.
    Rejected {
        /// State the engine was in.
        state: SyncState,
    },
}

impl CycleOutcome {
    /// Returns the report of a completed cycle.
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            CycleOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }

    /// Returns true if the trigger was dropped.
    pub fn is_rejected(&self) -> bool {
        matches!(self, CycleOutcome::Rejected { .. })
    }
}

/// Versioning metadata owned by the engine.
#[derive(Debug, Clone, Default)]
pub struct SyncMetadata {
    /// Wall-clock time of the last completed cycle.
    pub last_sync_time: Option<SystemTime>,
    /// Current version of the record store.
    pub local_version: u64,
    /// Highest remote version applied.
    pub remote_version: u64,
    /// Number of conflicts resolved with a strategy.
    pub conflicts_resolved: u64,
    /// The conflict awaiting the user, if any.
    pub pending_conflict: Option<Conflict>,
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of sync cycles completed.
    pub cycles_completed: u64,
    /// Cycles that ended in an error.
    pub failed_cycles: u64,
    /// Total number of fetch retries.
    pub retries: u64,
    /// Triggers dropped because a cycle was running or blocked.
    pub coalesced_triggers: u64,
    /// Conflicts handed to the user.
    pub conflicts_deferred: u64,
    /// Pending conflicts the user discarded.
    pub conflicts_discarded: u64,
    /// Items acknowledged by the server.
    pub items_uploaded: u64,
    /// Mutations that could not be persisted.
    pub persist_warnings: u64,
    /// Classification of the last completed cycle.
    pub last_outcome: Option<OutcomeKind>,
    /// Duration of the last completed cycle.
    pub last_cycle_duration: Option<Duration>,
    /// Last error message.
    pub last_error: Option<String>,
}
