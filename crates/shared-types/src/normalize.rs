//! # Address and Hash Normalization
//!
//! Addresses are 40-hex, lowercase, `0x`-prefixed. Transaction and block
//! hashes are 64-hex, lowercase. The API accepts either form; persistence
//! canonicalizes to the `0x` form. Lookups against legacy rows must try the
//! unprefixed form as well.

use crate::errors::ModelError;
use crate::hex0x;
use crate::Hash;

/// Normalize a hash string to its canonical form: lowercase, `0x`-prefixed.
///
/// # Errors
///
/// Returns `ModelError::MalformedHash` if the input is not 64 hex digits.
pub fn normalize_hash(input: &str) -> Result<String, ModelError> {
    let stripped = hex0x::strip_prefix(input.trim());
    if stripped.len() != 64 || !stripped.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ModelError::MalformedHash(input.to_string()));
    }
    Ok(format!("0x{}", stripped.to_ascii_lowercase()))
}

/// Parse a hash string (either form) into its 32-byte digest.
pub fn parse_hash(input: &str) -> Result<Hash, ModelError> {
    let canonical = normalize_hash(input)?;
    let bytes = hex0x::decode(&canonical).map_err(|_| ModelError::MalformedHash(input.into()))?;
    bytes
        .try_into()
        .map_err(|_| ModelError::MalformedHash(input.to_string()))
}

/// Format a 32-byte digest in the canonical string form.
pub fn format_hash(hash: &Hash) -> String {
    hex0x::encode(hash)
}

/// Both lookup keys for a hash: the canonical `0x` form and the legacy
/// unprefixed form, in preference order.
pub fn lookup_forms(hash: &Hash) -> [String; 2] {
    let bare = hex::encode(hash);
    [format!("0x{bare}"), bare]
}

/// Normalize an address string to lowercase `0x` + 40 hex digits.
pub fn normalize_address(input: &str) -> Result<String, ModelError> {
    let stripped = hex0x::strip_prefix(input.trim());
    if stripped.len() != 40 || !stripped.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ModelError::MalformedAddress(input.to_string()));
    }
    Ok(format!("0x{}", stripped.to_ascii_lowercase()))
}
