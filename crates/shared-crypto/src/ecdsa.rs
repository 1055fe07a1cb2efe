//! # ECDSA Signatures (secp256k1)
//!
//! Recoverable signatures over 32-byte digests.
//!
//! ## Security Properties
//!
//! - RFC 6979 deterministic nonces (no RNG dependency for signing)
//! - Low-S normalization
//! - Verification faults are a definite `false`, never an error
//!
//! Signatures are 65 bytes: `r ‖ s ‖ v` where `v` is the recovery id.
//! Account addresses are the last 20 bytes of the Keccak-256 of the
//! uncompressed public key body.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use zeroize::Zeroize;

use shared_types::{Address, BlockSigner, Hash, TransactionVerifier};

use crate::hashing::keccak256;
use crate::CryptoError;

/// Length of a recoverable signature: 64-byte r||s plus the recovery id.
pub const SIGNATURE_LEN: usize = 65;

/// Compressed secp256k1 public key (33 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey([u8; 33]);

impl PublicKey {
    /// Create from compressed bytes (33 bytes, starting with 0x02 or 0x03).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; 33] = bytes.try_into().map_err(|_| CryptoError::InvalidPublicKey)?;
        VerifyingKey::from_sec1_bytes(&array).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(array))
    }

    /// Raw compressed bytes.
    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }

    /// Derive the account address from this key.
    pub fn to_address(&self) -> Address {
        let Ok(key) = VerifyingKey::from_sec1_bytes(&self.0) else {
            // Unreachable: construction validated the point.
            return Address::ZERO;
        };
        address_of(&key)
    }
}

fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 uncompressed marker; hash the 64-byte body.
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..]);
    Address(out)
}

/// Recover the signing key from a 65-byte recoverable signature.
fn recover_key(digest: &Hash, signature: &[u8]) -> Option<VerifyingKey> {
    if signature.len() != SIGNATURE_LEN {
        return None;
    }
    let sig = Signature::from_slice(&signature[..64]).ok()?;
    let recid = RecoveryId::from_byte(signature[64])?;
    VerifyingKey::recover_from_prehash(digest, &sig, recid).ok()
}

/// The node's secp256k1 identity keypair.
pub struct NodeKeyPair {
    signing_key: SigningKey,
}

impl NodeKeyPair {
    /// Generate a random keypair.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand::thread_rng()),
        }
    }

    /// Create from secret key bytes (32 bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let mut array: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidPrivateKey)?;
        let result = SigningKey::from_bytes((&array).into())
            .map(|signing_key| Self { signing_key })
            .map_err(|_| CryptoError::InvalidPrivateKey);
        array.zeroize();
        result
    }

    /// Create from a hex-encoded secret key.
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        let mut bytes =
            hex::decode(hex_key.trim_start_matches("0x")).map_err(|_| CryptoError::InvalidPrivateKey)?;
        let result = Self::from_bytes(&bytes);
        bytes.zeroize();
        result
    }

    /// The raw secret scalar. Handle with care; callers should zeroize.
    pub fn secret_bytes(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }

    /// The compressed public key.
    pub fn public_key(&self) -> PublicKey {
        let sec1 = self.signing_key.verifying_key().to_sec1_bytes();
        let mut bytes = [0u8; 33];
        bytes.copy_from_slice(&sec1[..33]);
        PublicKey(bytes)
    }

    /// The account address of this keypair.
    pub fn address(&self) -> Address {
        address_of(self.signing_key.verifying_key())
    }

    /// Sign a 32-byte digest, returning `r ‖ s ‖ v`.
    pub fn sign_digest(&self, digest: &Hash) -> Result<Vec<u8>, CryptoError> {
        let (sig, recid) = self
            .signing_key
            .sign_prehash_recoverable(digest)
            .map_err(|_| CryptoError::SigningFailed)?;
        let mut out = Vec::with_capacity(SIGNATURE_LEN);
        out.extend_from_slice(&sig.to_bytes());
        out.push(recid.to_byte());
        Ok(out)
    }
}

/// Stateless verifier backed by public-key recovery.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveringVerifier;

impl TransactionVerifier for RecoveringVerifier {
    fn verify(&self, digest: &Hash, signature: &[u8], signer: &Address) -> bool {
        match recover_key(digest, signature) {
            Some(key) => address_of(&key) == *signer,
            None => false,
        }
    }

    fn recover(&self, digest: &Hash, signature: &[u8]) -> Option<Address> {
        recover_key(digest, signature).map(|key| address_of(&key))
    }
}

impl BlockSigner for NodeKeyPair {
    fn sign(&self, digest: &Hash) -> Vec<u8> {
        // RFC 6979 signing over a valid digest cannot fail; fall back to an
        // empty (never-verifying) signature rather than panicking.
        self.sign_digest(digest).unwrap_or_default()
    }

    fn address(&self) -> Address {
        NodeKeyPair::address(self)
    }
}
