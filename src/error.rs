//! Error types shared by the storage layer.
//!
//! Capacity exhaustion is normally intercepted by the quota manager; when a
//! caller needs a quota outcome as an error it arrives as `QuotaUnresolved`.
//! Everything else is returned unchanged. Protected-path writes and malformed
//! persisted data are handled in place and never show up here.

use crate::services::storage::SafeWriteFailure;
use thiserror::Error;

/// Errors produced by key/value stores, backends and the runtime bridge.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The key/value store refused a write because its quota is used up
    #[error("storage quota exceeded while writing '{key}'")]
    CapacityExceeded { key: String },

    /// A quota-guarded write gave up; `reason` says whether the user
    /// cancelled or the cleanup freed too little
    #[error("could not save '{key}': {reason}")]
    QuotaUnresolved {
        key: String,
        reason: SafeWriteFailure,
    },

    /// The authoritative backend could not be reached
    #[error("storage backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Any other failure reported by a store or backend
    #[error("storage error: {0}")]
    Store(String),

    /// JSON encoding failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error from a file-backed store
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn capacity_exceeded(key: impl Into<String>) -> Self {
        StorageError::CapacityExceeded { key: key.into() }
    }

    pub fn quota_unresolved(key: impl Into<String>, reason: SafeWriteFailure) -> Self {
        StorageError::QuotaUnresolved {
            key: key.into(),
            reason,
        }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        StorageError::Store(msg.into())
    }

    /// True for the one failure mode the quota manager knows how to recover from.
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, StorageError::CapacityExceeded { .. })
    }

    /// How a quota-guarded write ended, if that is why this error exists
    pub fn quota_failure(&self) -> Option<SafeWriteFailure> {
        match self {
            StorageError::QuotaUnresolved { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_classification() {
        assert!(StorageError::capacity_exceeded("k").is_capacity_exceeded());
        assert!(!StorageError::store("boom").is_capacity_exceeded());
        assert!(!StorageError::BackendUnavailable("offline".into()).is_capacity_exceeded());
    }

    #[test]
    fn test_quota_unresolved_keeps_reason() {
        let err = StorageError::quota_unresolved("vfs_files_v1", SafeWriteFailure::Cancelled);
        assert_eq!(err.quota_failure(), Some(SafeWriteFailure::Cancelled));
        assert!(!err.is_capacity_exceeded());
        assert_eq!(
            err.to_string(),
            "could not save 'vfs_files_v1': storage quota exceeded: cleanup cancelled"
        );
        assert_eq!(StorageError::capacity_exceeded("k").quota_failure(), None);
    }

    #[test]
    fn test_display_names_key() {
        let err = StorageError::capacity_exceeded("snapshots_abc");
        assert_eq!(
            err.to_string(),
            "storage quota exceeded while writing 'snapshots_abc'"
        );
    }
}
