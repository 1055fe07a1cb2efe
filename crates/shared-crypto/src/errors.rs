//! Crypto error types.

use thiserror::Error;

/// Errors from key handling and envelope encryption.
///
/// Signature verification never returns an error: a verification fault of
/// any kind is reported as `false` by the verifying APIs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Byte slice is not a valid private scalar.
    #[error("invalid private key")]
    InvalidPrivateKey,

    /// Byte slice is not a valid curve point.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Signing failed.
    #[error("signing failed")]
    SigningFailed,

    /// Ciphertext is malformed or authentication failed.
    #[error("decryption failed")]
    DecryptionFailed,

    /// Input shorter than the scheme's framing requires.
    #[error("ciphertext too short")]
    CiphertextTooShort,
}
