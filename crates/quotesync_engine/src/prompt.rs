//! User prompt collaborator for deferred conflicts.

use parking_lot::Mutex;
use quotesync_protocol::{Conflict, Strategy};

/// Presents a conflict to the user when the strategy is `AskUser`.
///
/// `present` only notifies. The answer arrives later through
/// [`SyncEngine::resolve_pending`](crate::SyncEngine::resolve_pending); the
/// engine stays [`Blocked`](crate::SyncState::Blocked) until then.
pub trait ConflictPrompt: Send + Sync {
    /// Shows `conflict` to the user.
    fn present(&self, conflict: &Conflict);
}

/// The user's answer to a presented conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptDecision {
    /// Resolve with a concrete strategy. `AskUser` is rejected.
    Resolve(Strategy),
    /// Drop the fetched remote snapshot and go back to idle.
    Discard,
    /// Leave the conflict pending.
    KeepBlocked,
}

/// A prompt that records every conflict it is shown.
#[derive(Debug, Default)]
pub struct RecordingPrompt {
    presented: Mutex<Vec<Conflict>>,
}

impl RecordingPrompt {
    /// Creates an empty recording prompt.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all presented conflicts, oldest first.
    pub fn presented(&self) -> Vec<Conflict> {
        self.presented.lock().clone()
    }

    /// Returns the most recently presented conflict.
    pub fn last(&self) -> Option<Conflict> {
        self.presented.lock().last().cloned()
    }

    /// Returns how many conflicts were presented.
    pub fn count(&self) -> usize {
        self.presented.lock().len()
    }
}

impl ConflictPrompt for RecordingPrompt {
    fn present(&self, conflict: &Conflict) {
        self.presented.lock().push(conflict.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotesync_protocol::{detect, ConflictOutcome, Item, Payload, Snapshot};

    #[test]
    fn recording_prompt_keeps_history() {
        let local = Snapshot::new(vec![Item::remote("1", Payload::new("A", "x"))], 1);
        let remote = Snapshot::new(vec![Item::remote("1", Payload::new("B", "x"))], 2);
        let ConflictOutcome::Conflict(conflict) = detect(&local, &remote) else {
            panic!("expected a conflict");
        };

        let prompt = RecordingPrompt::new();
        assert!(prompt.last().is_none());
        prompt.present(&conflict);
        prompt.present(&conflict);

        assert_eq!(prompt.count(), 2);
        assert_eq!(prompt.last().unwrap().modified.len(), 1);
    }
}
