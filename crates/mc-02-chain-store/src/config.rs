//! Chain store configuration.

use std::path::{Path, PathBuf};

/// Configuration for the binary chain store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the chain file, index, and backups.
    pub data_dir: PathBuf,
    /// AES-256 key for record payloads; `None` stores plaintext records.
    pub encryption_key: Option<[u8; 32]>,
    /// Maximum encoded record payload size.
    pub max_record_bytes: usize,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            encryption_key: None,
            max_record_bytes: 16 * 1024 * 1024,
        }
    }

    pub fn with_encryption_key(mut self, key: [u8; 32]) -> Self {
        self.encryption_key = Some(key);
        self
    }

    /// Path of the chain file.
    pub fn chain_path(&self) -> PathBuf {
        self.data_dir.join("blockchain.bin")
    }

    /// Path of the sidecar index.
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("blockchain.idx")
    }

    /// Directory for timestamped backups.
    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    /// Scratch directory for atomic rewrites.
    pub fn tmp_dir(&self) -> PathBuf {
        self.data_dir.join("tmp")
    }

    /// Advisory lock file guarding the store.
    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join("blockchain.lock")
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
