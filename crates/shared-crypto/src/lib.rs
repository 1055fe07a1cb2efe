//! # Shared Crypto - Cryptographic Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | SHA-256, Keccak-256, HMAC-SHA256 | Digests, MACs |
//! | `ecdsa` | secp256k1 | Transaction/block signing, recovery |
//! | `symmetric` | AES-256-CBC | Chain-file record encryption |
//! | `ecies` | secp256k1 ECDH + AES-CBC + HMAC | Envelope encryption |
//!
//! ## Security Properties
//!
//! - **secp256k1**: RFC 6979 deterministic nonces, low-S normalization
//! - **HMAC verify**: constant-time comparison
//! - **Verification never throws**: any fault is a definite `false`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ecdsa;
pub mod ecies;
pub mod errors;
pub mod hashing;
pub mod symmetric;

pub use ecdsa::{NodeKeyPair, PublicKey, RecoveringVerifier};
pub use errors::CryptoError;
pub use hashing::{hmac_sha256, keccak256, sha256};
pub use symmetric::{aes_cbc_decrypt, aes_cbc_encrypt, random_bytes};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
