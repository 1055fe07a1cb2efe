//! # ECIES Envelope Encryption
//!
//! Ephemeral-key encryption to a secp256k1 public key:
//!
//! 1. Generate an ephemeral keypair and run ECDH against the recipient key.
//! 2. Derive the encryption and MAC keys from the shared x-coordinate with
//!    domain-separated SHA-256.
//! 3. AES-256-CBC encrypt under a random IV.
//! 4. Tag `iv ‖ ciphertext` with HMAC-SHA256.
//!
//! Output layout: `ephemeral_pub(33) ‖ iv(16) ‖ ciphertext ‖ tag(32)`.
//! There are no alternate MAC derivations: a tag mismatch is a failure.

use k256::ecdh::diffie_hellman;
use k256::{PublicKey as K256PublicKey, SecretKey};

use crate::hashing::{hmac_verify, sha256_many};
use crate::symmetric::{aes_cbc_decrypt, aes_cbc_encrypt, random_bytes, IV_LEN, KEY_LEN};
use crate::{hmac_sha256, CryptoError, PublicKey};

const EPHEMERAL_LEN: usize = 33;
const TAG_LEN: usize = 32;

const ENC_DOMAIN: &[u8] = b"meridian/ecies/enc";
const MAC_DOMAIN: &[u8] = b"meridian/ecies/mac";

fn derive_keys(shared_x: &[u8]) -> ([u8; KEY_LEN], [u8; KEY_LEN]) {
    (
        sha256_many(&[ENC_DOMAIN, shared_x]),
        sha256_many(&[MAC_DOMAIN, shared_x]),
    )
}

/// Encrypt `plaintext` to `recipient`.
pub fn encrypt(recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let recipient_key = K256PublicKey::from_sec1_bytes(recipient.as_bytes())
        .map_err(|_| CryptoError::InvalidPublicKey)?;

    let ephemeral = SecretKey::random(&mut rand::thread_rng());
    let shared = diffie_hellman(ephemeral.to_nonzero_scalar(), recipient_key.as_affine());
    let (enc_key, mac_key) = derive_keys(shared.raw_secret_bytes());

    let iv_bytes = random_bytes(IV_LEN);
    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&iv_bytes);
    let ciphertext = aes_cbc_encrypt(&enc_key, &iv, plaintext);

    let ephemeral_pub = ephemeral.public_key().to_sec1_bytes();

    let mut out = Vec::with_capacity(EPHEMERAL_LEN + IV_LEN + ciphertext.len() + TAG_LEN);
    out.extend_from_slice(&ephemeral_pub);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    let tag = hmac_sha256(&mac_key, &out[EPHEMERAL_LEN..]);
    out.extend_from_slice(&tag);
    Ok(out)
}

/// Decrypt an ECIES envelope with the recipient's secret key bytes.
pub fn decrypt(secret_key: &[u8], envelope: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if envelope.len() < EPHEMERAL_LEN + IV_LEN + TAG_LEN {
        return Err(CryptoError::CiphertextTooShort);
    }
    let secret =
        SecretKey::from_slice(secret_key).map_err(|_| CryptoError::InvalidPrivateKey)?;

    let (ephemeral_bytes, rest) = envelope.split_at(EPHEMERAL_LEN);
    let (body, tag) = rest.split_at(rest.len() - TAG_LEN);

    let ephemeral = K256PublicKey::from_sec1_bytes(ephemeral_bytes)
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let shared = diffie_hellman(secret.to_nonzero_scalar(), ephemeral.as_affine());
    let (enc_key, mac_key) = derive_keys(shared.raw_secret_bytes());

    if !hmac_verify(&mac_key, body, tag) {
        return Err(CryptoError::DecryptionFailed);
    }

    let (iv_bytes, ciphertext) = body.split_at(IV_LEN);
    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(iv_bytes);
    aes_cbc_decrypt(&enc_key, &iv, ciphertext)
}
