//! Error types for the storage primitive contract.
//!
//! The store itself never surfaces these to callers: every public operation
//! on [`KeyedStore`](crate::KeyedStore) returns a value (a status boolean, a
//! default, or a count) rather than an error. The types here exist so that
//! backend implementations can report failures precisely and the store can
//! decide policy (degrade, sweep, or drop) per failure class.

use thiserror::Error;

/// Failures reported by the underlying storage primitive.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The primitive cannot be written to at all (disabled, sandboxed, or
    /// absent). The store degrades every operation to a safe no-op.
    #[error("storage primitive unavailable: {reason}")]
    Unavailable { reason: String },

    /// A write was rejected because it would exceed the primitive's
    /// capacity. The store responds with one eviction sweep and drops the
    /// write; it never retries in the same attempt.
    #[error("storage quota exceeded: {required} bytes required, {capacity} bytes capacity")]
    QuotaExceeded { required: usize, capacity: usize },

    /// Any other write rejection.
    #[error("write rejected: {reason}")]
    WriteRejected { reason: String },
}

impl BackendError {
    /// Returns true if this failure is capacity exhaustion.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_classification() {
        let quota = BackendError::QuotaExceeded {
            required: 2048,
            capacity: 1024,
        };
        assert!(quota.is_quota_exceeded());

        let unavailable = BackendError::Unavailable {
            reason: "disabled".to_string(),
        };
        assert!(!unavailable.is_quota_exceeded());
    }

    #[test]
    fn test_error_display() {
        let err = BackendError::QuotaExceeded {
            required: 2048,
            capacity: 1024,
        };
        assert_eq!(
            err.to_string(),
            "storage quota exceeded: 2048 bytes required, 1024 bytes capacity"
        );
    }
}
