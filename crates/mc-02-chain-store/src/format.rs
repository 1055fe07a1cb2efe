//! # Chain File Byte Format
//!
//! ```text
//! File header (16 bytes):
//!   magic   "BLKC"          4 bytes
//!   version u32 LE          4 bytes
//!   created u32 LE          4 bytes (unix seconds)
//!   reserved u32 LE         4 bytes
//!
//! Per-record:
//!   size    u32 LE          payload byte count
//!   crc     u32 LE          CRC32 of payload
//!   flags   u8              bit0 = encrypted
//!   payload [u8; size]
//! ```
//!
//! Plaintext payload is `deflate(JSON block)`. Encrypted payload is
//! `iv(16) ‖ AES-256-CBC(key, iv, deflate(JSON block))`.

use std::io::Write;

use flate2::write::{DeflateDecoder, DeflateEncoder};
use flate2::Compression;

use shared_crypto::symmetric::{aes_cbc_decrypt, aes_cbc_encrypt, random_bytes, IV_LEN};
use shared_types::Block;

use crate::errors::StoreError;

/// File magic.
pub const MAGIC: &[u8; 4] = b"BLKC";

/// Current format version.
pub const VERSION: u32 = 1;

/// Fixed header length.
pub const HEADER_LEN: usize = 16;

/// Per-record prefix length: size + crc + flags.
pub const RECORD_PREFIX_LEN: usize = 9;

/// Record flag: payload is AES-256-CBC encrypted.
pub const FLAG_ENCRYPTED: u8 = 0b0000_0001;

/// Encode the file header.
pub fn encode_header(created_unix: u32) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0..4].copy_from_slice(MAGIC);
    header[4..8].copy_from_slice(&VERSION.to_le_bytes());
    header[8..12].copy_from_slice(&created_unix.to_le_bytes());
    // Bytes 12..16 reserved.
    header
}

/// Validate a file header.
pub fn check_header(header: &[u8]) -> Result<(), StoreError> {
    if header.len() < HEADER_LEN {
        return Err(StoreError::BadHeader {
            reason: format!("file shorter than {HEADER_LEN}-byte header"),
        });
    }
    if &header[0..4] != MAGIC {
        return Err(StoreError::BadHeader {
            reason: "bad magic".to_string(),
        });
    }
    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if version != VERSION {
        return Err(StoreError::BadHeader {
            reason: format!("unsupported version {version}"),
        });
    }
    Ok(())
}

fn deflate(bytes: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

fn inflate(bytes: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut decoder = DeflateDecoder::new(Vec::new());
    decoder.write_all(bytes)?;
    decoder.finish()
}

/// Encode a block into a complete record (prefix + payload).
pub fn encode_record(block: &Block, key: Option<&[u8; 32]>) -> Result<Vec<u8>, StoreError> {
    let json = serde_json::to_vec(block).map_err(|e| StoreError::WriteError(e.into()))?;
    let compressed = deflate(&json)?;

    let (payload, flags) = match key {
        Some(key) => {
            let iv_bytes = random_bytes(IV_LEN);
            let mut iv = [0u8; IV_LEN];
            iv.copy_from_slice(&iv_bytes);
            let mut payload = iv.to_vec();
            payload.extend_from_slice(&aes_cbc_encrypt(key, &iv, &compressed));
            (payload, FLAG_ENCRYPTED)
        }
        None => (compressed, 0u8),
    };

    let crc = crc32fast::hash(&payload);
    let mut record = Vec::with_capacity(RECORD_PREFIX_LEN + payload.len());
    record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    record.extend_from_slice(&crc.to_le_bytes());
    record.push(flags);
    record.extend_from_slice(&payload);
    Ok(record)
}

/// Decode a record payload back into a block.
///
/// `offset` is the record's file position, used only for error context.
pub fn decode_payload(
    payload: &[u8],
    flags: u8,
    crc: u32,
    offset: u64,
    key: Option<&[u8; 32]>,
) -> Result<Block, StoreError> {
    if crc32fast::hash(payload) != crc {
        return Err(StoreError::CorruptRecord {
            offset,
            reason: "crc mismatch".to_string(),
        });
    }

    let compressed: Vec<u8>;
    let compressed = if flags & FLAG_ENCRYPTED != 0 {
        let key = key.ok_or(StoreError::MissingKey)?;
        if payload.len() < IV_LEN {
            return Err(StoreError::CorruptRecord {
                offset,
                reason: "encrypted payload shorter than iv".to_string(),
            });
        }
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&payload[..IV_LEN]);
        compressed =
            aes_cbc_decrypt(key, &iv, &payload[IV_LEN..]).map_err(|e| StoreError::CorruptRecord {
                offset,
                reason: format!("decryption failed: {e}"),
            })?;
        &compressed[..]
    } else {
        payload
    };

    let json = inflate(compressed).map_err(|_| StoreError::CorruptRecord {
        offset,
        reason: "deflate stream invalid".to_string(),
    })?;
    serde_json::from_slice(&json).map_err(|e| StoreError::CorruptRecord {
        offset,
        reason: format!("block json invalid: {e}"),
    })
}
