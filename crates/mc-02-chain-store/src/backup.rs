//! # Backup and Restore
//!
//! A backup is a timestamped directory holding a copy of the chain file,
//! the index, and an integrity manifest: SHA-256 of both files plus the
//! hash of every block. Restore refuses a backup whose manifest does not
//! verify.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::StoreConfig;
use crate::errors::StoreError;
use crate::index;
use crate::store::ChainStore;

/// Integrity manifest written alongside every backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub created_at: u64,
    pub tip_height: Option<u64>,
    /// SHA-256 of the chain file, hex.
    pub file_sha256: String,
    /// SHA-256 of the index file, hex.
    pub index_sha256: String,
    /// Canonical hash of every block, in height order.
    pub block_hashes: Vec<String>,
}

const MANIFEST_NAME: &str = "manifest.json";

fn sha256_file(path: &Path) -> Result<String, StoreError> {
    let bytes = fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn build_manifest(config: &StoreConfig, created_at: u64) -> Result<BackupManifest, StoreError> {
    let entries = index::load(&config.index_path())?;
    Ok(BackupManifest {
        created_at,
        tip_height: entries.last().map(|e| e.height),
        file_sha256: sha256_file(&config.chain_path())?,
        index_sha256: sha256_file(&config.index_path())?,
        block_hashes: entries
            .iter()
            .map(|e| shared_types::normalize::format_hash(&e.hash))
            .collect(),
    })
}

/// Verify a backup directory against its manifest.
pub fn verify_backup(dir: &Path) -> Result<BackupManifest, StoreError> {
    let manifest_bytes = fs::read(dir.join(MANIFEST_NAME))
        .map_err(|_| StoreError::BackupIntegrity("manifest missing".to_string()))?;
    let manifest: BackupManifest = serde_json::from_slice(&manifest_bytes)
        .map_err(|e| StoreError::BackupIntegrity(format!("manifest invalid: {e}")))?;

    let file_sha = sha256_file(&dir.join("blockchain.bin"))?;
    if file_sha != manifest.file_sha256 {
        return Err(StoreError::BackupIntegrity("chain file hash mismatch".to_string()));
    }
    let index_sha = sha256_file(&dir.join("blockchain.idx"))?;
    if index_sha != manifest.index_sha256 {
        return Err(StoreError::BackupIntegrity("index hash mismatch".to_string()));
    }
    Ok(manifest)
}

/// List backup directories, newest first.
pub fn list_backups(config: &StoreConfig) -> Result<Vec<PathBuf>, StoreError> {
    let root = config.backup_dir();
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut dirs: Vec<PathBuf> = fs::read_dir(&root)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs.reverse();
    Ok(dirs)
}

impl ChainStore {
    /// Copy the chain file, index, and an integrity manifest into a new
    /// timestamped directory under `backups/`. Returns the directory.
    pub fn backup(&self) -> Result<PathBuf, StoreError> {
        self.locked_rewrite(|config| {
            let created_at = shared_types::clock::now_unix();
            let dir = config.backup_dir().join(format!("backup_{created_at}"));
            fs::create_dir_all(&dir)?;

            fs::copy(config.chain_path(), dir.join("blockchain.bin"))?;
            fs::copy(config.index_path(), dir.join("blockchain.idx"))?;

            let manifest = build_manifest(config, created_at)?;
            fs::write(
                dir.join(MANIFEST_NAME),
                serde_json::to_vec_pretty(&manifest).map_err(|e| StoreError::WriteError(e.into()))?,
            )?;

            info!(dir = %dir.display(), tip = ?manifest.tip_height, "backup written");
            Ok(dir)
        })
    }

    /// Replace the live store with the contents of a verified backup.
    ///
    /// # Errors
    ///
    /// `BackupIntegrity` when the manifest is missing or does not match
    /// the backup's files; the live store is left untouched.
    pub fn restore(&self, backup_dir: &Path) -> Result<BackupManifest, StoreError> {
        let manifest = verify_backup(backup_dir)?;
        self.locked_rewrite(|config| {
            // Stage into tmp, then rename over the live files.
            let staged_bin = config.tmp_dir().join("restore.bin");
            let staged_idx = config.tmp_dir().join("restore.idx");
            fs::copy(backup_dir.join("blockchain.bin"), &staged_bin)?;
            fs::copy(backup_dir.join("blockchain.idx"), &staged_idx)?;
            fs::rename(&staged_bin, config.chain_path())?;
            fs::rename(&staged_idx, config.index_path())?;
            info!(from = %backup_dir.display(), "store restored from backup");
            Ok(())
        })?;
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{Address, Block};

    fn populated_store(dir: &Path, n: u64) -> ChainStore {
        let store = ChainStore::open(StoreConfig::new(dir)).unwrap();
        let validator = Address([9; 20]);
        let mut parent: Option<Block> = None;
        for height in 0..n {
            let block = match &parent {
                None => Block::genesis(1_700_000_000, validator),
                Some(p) => Block::assemble(height, p.hash, p.timestamp + 10, validator, vec![]),
            };
            store.append(&block).unwrap();
            parent = Some(block);
        }
        store
    }

    #[test]
    fn test_backup_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let store = populated_store(dir.path(), 4);
        let backup_dir = store.backup().unwrap();
        let manifest = verify_backup(&backup_dir).unwrap();
        assert_eq!(manifest.tip_height, Some(3));
        assert_eq!(manifest.block_hashes.len(), 4);
    }

    #[test]
    fn test_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = populated_store(dir.path(), 5);
        let tip_before = store.tip().unwrap();
        let backup_dir = store.backup().unwrap();

        // Wreck the live chain file.
        fs::write(dir.path().join("blockchain.bin"), b"garbage").unwrap();

        store.restore(&backup_dir).unwrap();
        assert_eq!(store.tip().unwrap(), tip_before);
        assert!(store.validate_chain().unwrap().is_clean());
    }

    #[test]
    fn test_restore_rejects_tampered_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = populated_store(dir.path(), 3);
        let backup_dir = store.backup().unwrap();

        // Tamper with the backed-up chain file.
        let path = backup_dir.join("blockchain.bin");
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            store.restore(&backup_dir),
            Err(StoreError::BackupIntegrity(_))
        ));
    }

    #[test]
    fn test_list_backups_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = populated_store(dir.path(), 2);
        let config = StoreConfig::new(dir.path());
        assert!(list_backups(&config).unwrap().is_empty());

        let first = store.backup().unwrap();
        // Distinct directory even within the same second.
        let second = first.parent().unwrap().join("backup_zzz");
        fs::create_dir_all(&second).unwrap();

        let listed = list_backups(&config).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], second);
    }
}
