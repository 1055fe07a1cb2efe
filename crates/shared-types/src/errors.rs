//! # Shared Error Kinds
//!
//! Model-level validation errors plus the cross-subsystem failure
//! classification that drives retry and recovery policy.

use thiserror::Error;

/// Validation errors for transactions and blocks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("malformed address: {0}")]
    MalformedAddress(String),

    #[error("malformed hash: {0}")]
    MalformedHash(String),

    #[error("transaction hash does not match its canonical recomputation")]
    HashMismatch,

    #[error("self transfers are not allowed")]
    SelfTransfer,

    #[error("missing signature")]
    MissingSignature,

    #[error("signature does not verify for the sender")]
    BadSignature,

    #[error("merkle root does not match the transaction list")]
    MerkleMismatch,

    #[error("block height {actual} does not follow parent height {parent}")]
    NonSequentialHeight { parent: u64, actual: u64 },

    #[error("parent hash mismatch at height {height}")]
    ParentHashMismatch { height: u64 },

    #[error("block timestamp {actual} is not after parent timestamp {parent}")]
    TimestampNotIncreasing { parent: u64, actual: u64 },

    #[error("block timestamp {actual} exceeds local time {now} plus allowed skew")]
    TimestampInFuture { now: u64, actual: u64 },
}

/// Cross-subsystem failure classification.
///
/// Each operational error maps to exactly one kind, and the kind determines
/// the caller's policy: bounded retry, log-and-drop, or abort-and-recover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Bad shape, bad signature, bad hash. Client-facing, never retried.
    InvalidRequest,
    /// Already seen within the dedup TTL. Suppressed as success.
    DuplicateEvent,
    /// Sender must back off.
    RateLimited,
    /// Network or transient store fault. Retried with backoff.
    Transient,
    /// Invalid block. Recorded, dropped, source reputation lowered.
    ConsensusReject,
    /// Competing chain detected. Triggers fork resolution.
    ForkConflict,
    /// Store corruption. The node transitions to recovery.
    DataCorruption,
}

impl FailureKind {
    /// Whether the caller should retry the failed operation.
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureKind::Transient)
    }

    /// Whether the failure is fatal for the node's serving state.
    pub fn is_fatal(self) -> bool {
        matches!(self, FailureKind::DataCorruption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(FailureKind::Transient.is_retryable());
        assert!(!FailureKind::InvalidRequest.is_retryable());
        assert!(!FailureKind::ConsensusReject.is_retryable());
    }

    #[test]
    fn test_corruption_is_fatal() {
        assert!(FailureKind::DataCorruption.is_fatal());
        assert!(!FailureKind::RateLimited.is_fatal());
    }
}
