//! # Mempool - Pending Transaction Pool
//!
//! Admission, priority ordering, replace-by-fee, eviction, and nonce
//! discipline for unconfirmed transactions.
//!
//! ## Data Structures
//!
//! - `by_hash`: O(1) lookup by transaction hash
//! - `by_priority`: ordered set for block selection and eviction
//! - `by_sender`: nonce-ordered transactions per account
//!
//! ## Invariants
//!
//! - No duplicate hashes
//! - At most one entry per `(sender, nonce)`; a replacement must carry a
//!   strictly higher fee from the same signer
//! - Expired entries never reach block selection

pub mod entities;
pub mod errors;
pub mod pool;
pub mod service;

pub use entities::{MempoolConfig, MempoolEntry, PriorityWeights};
pub use errors::MempoolError;
pub use pool::{AddOutcome, NonceGap, TransactionPool};
pub use service::{Mempool, NonceProvider};
