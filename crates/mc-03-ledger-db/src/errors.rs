//! Ledger projection error types.

use thiserror::Error;

/// Errors from the relational projection.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Underlying store fault. Treated as transient by callers.
    #[error("database error: {0}")]
    Db(#[from] rocksdb::Error),

    /// Row encoding fault.
    #[error("row encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Requested row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A column family is missing from the opened database.
    #[error("missing table: {0}")]
    MissingTable(&'static str),

    /// Blocks must be inserted in height order.
    #[error("ordering violation: expected height {expected}, got {actual}")]
    OrderingViolation { expected: u64, actual: u64 },

    /// State transition rejected (balance or nonce rule).
    #[error("state violation for {address}: {reason}")]
    StateViolation { address: String, reason: String },

    /// Input failed normalization.
    #[error("{0}")]
    Model(#[from] shared_types::ModelError),
}
