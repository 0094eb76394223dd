//! Error types for the sync engine.

use quotesync_protocol::ResolveError;
use quotesync_store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors reported by a [`RemoteFetcher`](crate::RemoteFetcher).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The remote could not be reached, failed, or timed out.
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    /// The remote answered with content that could not be decoded.
    #[error("invalid remote data: {0}")]
    InvalidData(String),
}

impl FetchError {
    /// Creates the error reported when a call exceeds its timeout.
    pub fn timed_out(after: Duration) -> Self {
        Self::Unavailable(format!("timed out after {after:?}"))
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Unavailable(_))
    }
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Fetching or uploading failed.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The record store refused a mutation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The resolution policy could not produce a snapshot.
    #[error("resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    /// `resolve_pending` was called with no conflict awaiting an answer.
    #[error("no conflict is awaiting resolution")]
    NoPendingConflict,

    /// Every apply attempt lost the race against a concurrent insert.
    #[error("store kept changing during the cycle; gave up after {attempts} apply attempts")]
    ApplyContention {
        /// Number of attempts made.
        attempts: u32,
    },

    /// The configuration cannot drive an engine.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Fetch(e) => e.is_retryable(),
            SyncError::ApplyContention { .. } => true,
            SyncError::Store(e) => e.is_persistence(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotesync_protocol::ItemId;

    #[test]
    fn retryable_errors() {
        assert!(FetchError::Unavailable("connection lost".into()).is_retryable());
        assert!(FetchError::timed_out(Duration::from_secs(1)).is_retryable());
        assert!(!FetchError::InvalidData("not json".into()).is_retryable());

        assert!(SyncError::from(FetchError::Unavailable("x".into())).is_retryable());
        assert!(SyncError::ApplyContention { attempts: 3 }.is_retryable());
        assert!(!SyncError::from(StoreError::DuplicateId(ItemId::new("1"))).is_retryable());
        assert!(!SyncError::NoPendingConflict.is_retryable());
        assert!(!SyncError::from(ResolveError::DeferredStrategy).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::NoPendingConflict;
        assert_eq!(err.to_string(), "no conflict is awaiting resolution");

        let err = SyncError::from(FetchError::InvalidData("missing text".into()));
        assert_eq!(
            err.to_string(),
            "fetch failed: invalid remote data: missing text"
        );

        let err = FetchError::timed_out(Duration::from_millis(250));
        assert!(err.to_string().contains("250ms"));
    }
}
