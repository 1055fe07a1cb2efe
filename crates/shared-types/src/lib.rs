//! # Shared Types Crate
//!
//! This crate contains all cross-subsystem domain entities: blocks,
//! transactions, wallet accounts, validators, peer records, and the signed
//! event envelope used on the wire.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-subsystem types are defined here.
//! - **Canonical Hashing**: Every hashed structure has exactly one byte-level
//!   preimage, produced by [`canonical`].
//! - **Errors as Values**: Validation failures are returned, never thrown.

pub mod block;
pub mod canonical;
pub mod clock;
pub mod entities;
pub mod envelope;
pub mod errors;
pub mod hex0x;
pub mod merkle;
pub mod normalize;
pub mod ports;
pub mod transaction;

pub use block::{Block, BlockHeader};
pub use clock::{SystemTimeSource, TimeSource};
pub use entities::*;
pub use envelope::EventEnvelope;
pub use errors::{FailureKind, ModelError};
pub use merkle::{merkle_root, MerkleProof};
pub use ports::{BlockSigner, TransactionVerifier};
pub use transaction::{Transaction, TxStatus};

/// A 32-byte digest (SHA-256 or Keccak-256).
pub type Hash = [u8; 32];

/// The all-zero digest. Used as the genesis parent hash and as the merkle
/// root of an empty block.
pub const ZERO_HASH: Hash = [0u8; 32];
