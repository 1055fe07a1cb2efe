//! # Sidecar Index
//!
//! Newline-delimited JSON, one entry per block, rewritten atomically on
//! every append. The index is a pure derivation of the chain file and is
//! rebuilt from it on any disagreement.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use shared_types::Hash;

use crate::errors::StoreError;

/// One block's position in the chain file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub height: u64,
    /// Byte offset of the record prefix.
    pub position: u64,
    /// Payload byte count.
    pub size: u32,
    #[serde(with = "shared_types::hex0x::hash")]
    pub hash: Hash,
    pub timestamp: u64,
    pub tx_count: u32,
}

/// Load all entries from the sidecar file. A missing file is an empty
/// index.
pub fn load(path: &Path) -> Result<Vec<IndexEntry>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry: IndexEntry = serde_json::from_str(line).map_err(|e| StoreError::CorruptRecord {
            offset: lineno as u64,
            reason: format!("index line invalid: {e}"),
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Atomically rewrite the sidecar file: write to a temp sibling, then
/// rename over the target.
pub fn rewrite(path: &Path, entries: &[IndexEntry]) -> Result<(), StoreError> {
    let tmp_path = path.with_extension("idx.tmp");
    {
        let mut tmp = fs::File::create(&tmp_path)?;
        for entry in entries {
            let line = serde_json::to_string(entry).map_err(|e| StoreError::WriteError(e.into()))?;
            tmp.write_all(line.as_bytes())?;
            tmp.write_all(b"\n")?;
        }
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}
