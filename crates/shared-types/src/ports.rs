//! Injected cryptographic capabilities.
//!
//! The model validates signatures through these traits; the concrete
//! secp256k1 implementation lives in `shared-crypto`. Verification is
//! infallible by contract: a failure of any kind is a definite `false`.

use crate::entities::Address;
use crate::Hash;

/// Verifies transaction and block signatures.
pub trait TransactionVerifier: Send + Sync {
    /// Verify `signature` over `digest` for the claimed `signer` address.
    fn verify(&self, digest: &Hash, signature: &[u8], signer: &Address) -> bool;

    /// Recover the signing address from a recoverable signature, if possible.
    fn recover(&self, digest: &Hash, signature: &[u8]) -> Option<Address>;
}

/// Signs block digests with the node's validator key.
pub trait BlockSigner: Send + Sync {
    /// Produce a recoverable signature over `digest`.
    fn sign(&self, digest: &Hash) -> Vec<u8>;

    /// The address the signatures verify against.
    fn address(&self) -> Address;
}
