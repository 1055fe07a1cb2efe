//! # Digests and MACs
//!
//! SHA-256 for chain commitments, Keccak-256 for address derivation,
//! HMAC-SHA256 for broadcast authentication.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use sha3::Keccak256;

/// A 32-byte digest.
pub type Hash = [u8; 32];

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 one-shot.
pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// SHA-256 over multiple inputs.
pub fn sha256_many(inputs: &[&[u8]]) -> Hash {
    let mut hasher = Sha256::new();
    for input in inputs {
        hasher.update(input);
    }
    hasher.finalize().into()
}

/// Keccak-256 one-shot.
pub fn keccak256(data: &[u8]) -> Hash {
    Keccak256::digest(data).into()
}

/// HMAC-SHA256 tag over `message`.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Hash {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(message);
    mac.finalize().into_bytes().into()
}

/// Constant-time verification of an HMAC-SHA256 tag.
pub fn hmac_verify(key: &[u8], message: &[u8], tag: &[u8]) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(tag).is_ok()
}
