//! # Symmetric Encryption (AES-256-CBC)
//!
//! Used for the encrypted chain-file record payloads. PKCS7 padding.
//! Callers own IV management; the chain-file codec prepends the IV to
//! the ciphertext.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use rand::RngCore;

use crate::CryptoError;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES-CBC initialization vector length.
pub const IV_LEN: usize = 16;

/// AES-256 key length.
pub const KEY_LEN: usize = 32;

/// Encrypt `plaintext` under `key`/`iv` with PKCS7 padding.
pub fn aes_cbc_encrypt(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], plaintext: &[u8]) -> Vec<u8> {
    Aes256CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypt AES-256-CBC ciphertext.
///
/// # Errors
///
/// `DecryptionFailed` when the padding is invalid, which covers truncated
/// and corrupted ciphertexts.
pub fn aes_cbc_decrypt(
    key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Cryptographically secure random bytes.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut out = vec![0u8; n];
    rand::rngs::OsRng.fill_bytes(&mut out);
    out
}
