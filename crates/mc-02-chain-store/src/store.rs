//! # Chain Store Service
//!
//! Single-writer append, concurrent reads. The writer lock is held for
//! the disk write and the atomic index rewrite; readers only take the
//! read lock to resolve positions, then read the file directly.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use fs2::FileExt;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use shared_types::{Block, Hash, ModelError};

use crate::config::StoreConfig;
use crate::errors::StoreError;
use crate::format::{
    check_header, encode_header, encode_record, decode_payload, HEADER_LEN, RECORD_PREFIX_LEN,
};
use crate::index::{self, IndexEntry};

/// Result of an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The block was written and indexed.
    Appended,
    /// The block is already the tip; nothing was written.
    Duplicate,
}

/// Outcome of a full-chain logical validation walk.
#[derive(Debug, Default)]
pub struct ChainReport {
    pub blocks_checked: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ChainReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Outcome of a raw file structure scan.
#[derive(Debug, Default)]
pub struct FileReport {
    pub records: u64,
    /// (offset, reason) of each record that failed CRC or decode.
    pub corrupt: Vec<(u64, String)>,
}

impl FileReport {
    pub fn is_clean(&self) -> bool {
        self.corrupt.is_empty()
    }
}

/// Store counters for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub block_count: u64,
    pub tip_height: Option<u64>,
    pub file_bytes: u64,
}

struct Inner {
    /// Index entries ordered by append sequence (dense heights).
    entries: Vec<IndexEntry>,
    by_hash: HashMap<Hash, usize>,
    file_len: u64,
}

/// The append-only binary block log.
pub struct ChainStore {
    config: StoreConfig,
    /// Held for the store's lifetime; released on drop.
    _lock_file: File,
    inner: RwLock<Inner>,
}

impl ChainStore {
    /// Open (or create) the store at the configured directory.
    ///
    /// Takes an exclusive advisory lock; a second open of the same
    /// directory fails with `Locked`.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(config.data_dir())?;
        fs::create_dir_all(config.tmp_dir())?;

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(config.lock_path())?;
        lock_file.try_lock_exclusive().map_err(|_| StoreError::Locked)?;

        let chain_path = config.chain_path();
        if !chain_path.exists() {
            let mut file = File::create(&chain_path)?;
            file.write_all(&encode_header(shared_types::clock::now_unix() as u32))?;
            file.sync_all()?;
            info!(path = %chain_path.display(), "created chain file");
        } else {
            let mut header = vec![0u8; HEADER_LEN];
            let mut file = File::open(&chain_path)?;
            let read = file.read(&mut header)?;
            check_header(&header[..read])?;
        }

        let file_len = fs::metadata(&chain_path)?.len();
        let mut entries = index::load(&config.index_path())?;

        let indexed_end = entries
            .last()
            .map(|e| e.position + RECORD_PREFIX_LEN as u64 + u64::from(e.size))
            .unwrap_or(HEADER_LEN as u64);
        if indexed_end != file_len {
            warn!(
                indexed_end,
                file_len, "index does not cover chain file; rebuilding from records"
            );
            entries = Self::scan_entries(&chain_path, config.encryption_key.as_ref())?;
            index::rewrite(&config.index_path(), &entries)?;
        }

        let by_hash = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.hash, i))
            .collect();

        Ok(Self {
            config,
            _lock_file: lock_file,
            inner: RwLock::new(Inner {
                entries,
                by_hash,
                file_len,
            }),
        })
    }

    /// Append a validated block to the log.
    ///
    /// # Errors
    ///
    /// - `PreviousHashMismatch` when the parent hash is not the tip hash
    /// - `InvalidBlock` when structural invariants fail
    /// - `WriteError` on I/O faults
    pub fn append(&self, block: &Block) -> Result<AppendOutcome, StoreError> {
        block.validate_structure()?;

        let mut inner = self.inner.write();

        if let Some(last) = inner.entries.last() {
            if block.hash == last.hash {
                debug!(height = block.height, "duplicate append ignored");
                return Ok(AppendOutcome::Duplicate);
            }
            if block.parent_hash != last.hash {
                return Err(StoreError::PreviousHashMismatch { height: block.height });
            }
            if block.height != last.height + 1 {
                return Err(StoreError::InvalidBlock(ModelError::NonSequentialHeight {
                    parent: last.height,
                    actual: block.height,
                }));
            }
            if block.timestamp <= last.timestamp {
                return Err(StoreError::InvalidBlock(ModelError::TimestampNotIncreasing {
                    parent: last.timestamp,
                    actual: block.timestamp,
                }));
            }
        } else if block.height != 0 {
            // Bootstrap from a snapshot starts mid-chain.
            warn!(height = block.height, "first append is above genesis");
        }

        let record = encode_record(block, self.config.encryption_key.as_ref())?;
        let payload_len = record.len() - RECORD_PREFIX_LEN;
        if payload_len > self.config.max_record_bytes {
            return Err(StoreError::RecordTooLarge {
                size: payload_len,
                max: self.config.max_record_bytes,
            });
        }

        let position = inner.file_len;
        let mut file = OpenOptions::new().append(true).open(self.config.chain_path())?;
        file.write_all(&record)?;
        file.sync_data()?;

        let entry = IndexEntry {
            height: block.height,
            position,
            size: payload_len as u32,
            hash: block.hash,
            timestamp: block.timestamp,
            tx_count: block.tx_count,
        };
        inner.entries.push(entry);
        index::rewrite(&self.config.index_path(), &inner.entries)?;

        let idx = inner.entries.len() - 1;
        inner.by_hash.insert(block.hash, idx);
        inner.file_len += record.len() as u64;

        debug!(
            height = block.height,
            hash = %shared_types::normalize::format_hash(&block.hash),
            txs = block.tx_count,
            "block appended"
        );
        Ok(AppendOutcome::Appended)
    }

    /// Fetch the block at `height`.
    pub fn get(&self, height: u64) -> Result<Block, StoreError> {
        let entry = {
            let inner = self.inner.read();
            inner
                .entries
                .iter()
                .find(|e| e.height == height)
                .cloned()
                .ok_or(StoreError::NotFound { height })?
        };
        self.read_at(&entry)
    }

    /// Fetch the block with `hash`.
    pub fn get_by_hash(&self, hash: &Hash) -> Result<Block, StoreError> {
        let entry = {
            let inner = self.inner.read();
            let idx = *inner
                .by_hash
                .get(hash)
                .ok_or(StoreError::HashNotFound { hash: *hash })?;
            inner.entries[idx].clone()
        };
        self.read_at(&entry)
    }

    /// The highest block, or `None` on an empty store.
    pub fn last(&self) -> Result<Option<Block>, StoreError> {
        let entry = { self.inner.read().entries.last().cloned() };
        match entry {
            Some(entry) => self.read_at(&entry).map(Some),
            None => Ok(None),
        }
    }

    /// The tip (height, hash) without touching the file.
    pub fn tip(&self) -> Option<(u64, Hash)> {
        let inner = self.inner.read();
        inner.entries.last().map(|e| (e.height, e.hash))
    }

    /// Whether a block with `hash` exists.
    pub fn contains_hash(&self, hash: &Hash) -> bool {
        self.inner.read().by_hash.contains_key(hash)
    }

    /// All index entries in height order (cheap snapshot).
    pub fn index_snapshot(&self) -> Vec<IndexEntry> {
        self.inner.read().entries.clone()
    }

    /// Store counters.
    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        StoreStats {
            block_count: inner.entries.len() as u64,
            tip_height: inner.entries.last().map(|e| e.height),
            file_bytes: inner.file_len,
        }
    }

    /// Walk the chain, recomputing hashes and verifying linkage.
    pub fn validate_chain(&self) -> Result<ChainReport, StoreError> {
        let entries = self.index_snapshot();
        let mut report = ChainReport::default();
        let mut previous: Option<Block> = None;

        for entry in entries {
            let block = match self.read_at(&entry) {
                Ok(block) => block,
                Err(e) => {
                    report.errors.push(format!("height {}: {e}", entry.height));
                    continue;
                }
            };
            report.blocks_checked += 1;

            if let Err(e) = block.validate_structure() {
                report.errors.push(format!("height {}: {e}", block.height));
            }
            match &previous {
                Some(parent) => {
                    if let Err(e) = block.validate_linkage(parent) {
                        report.errors.push(format!("height {}: {e}", block.height));
                    }
                }
                None => {
                    if !block.is_genesis() {
                        report
                            .warnings
                            .push(format!("chain starts above genesis at height {}", block.height));
                    }
                }
            }
            previous = Some(block);
        }
        Ok(report)
    }

    /// Raw structural scan of the chain file: header, record framing,
    /// CRC, decryption, and digest of every record.
    pub fn validate_file(&self) -> Result<FileReport, StoreError> {
        let _guard = self.inner.read();
        let path = self.config.chain_path();
        let mut file = File::open(&path)?;
        let mut header = vec![0u8; HEADER_LEN];
        let read = file.read(&mut header)?;
        check_header(&header[..read])?;

        let mut report = FileReport::default();
        let file_len = fs::metadata(&path)?.len();
        let mut offset = HEADER_LEN as u64;

        while offset < file_len {
            match read_record(&mut file, offset, self.config.encryption_key.as_ref()) {
                Ok((block, consumed)) => {
                    if block.compute_hash() != block.hash {
                        report
                            .corrupt
                            .push((offset, "stored hash does not match digest".to_string()));
                    }
                    report.records += 1;
                    offset += consumed;
                }
                Err((reason, consumed)) => {
                    report.corrupt.push((offset, reason));
                    match consumed {
                        // Framing is broken: the rest of the file is unreadable.
                        None => break,
                        Some(consumed) => offset += consumed,
                    }
                }
            }
        }
        Ok(report)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Run an on-disk rewrite (repair or restore) under the writer lock,
    /// then reload the in-memory view from the rewritten files before
    /// releasing it.
    pub(crate) fn locked_rewrite<T>(
        &self,
        f: impl FnOnce(&StoreConfig) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut inner = self.inner.write();
        let result = f(&self.config)?;
        let entries = index::load(&self.config.index_path())?;
        inner.by_hash = entries.iter().enumerate().map(|(i, e)| (e.hash, i)).collect();
        inner.file_len = fs::metadata(self.config.chain_path())?.len();
        inner.entries = entries;
        Ok(result)
    }

    fn read_at(&self, entry: &IndexEntry) -> Result<Block, StoreError> {
        let mut file = File::open(self.config.chain_path())?;
        file.seek(SeekFrom::Start(entry.position))?;
        match read_record(&mut file, entry.position, self.config.encryption_key.as_ref()) {
            Ok((block, _)) => {
                if block.hash != entry.hash {
                    return Err(StoreError::CorruptRecord {
                        offset: entry.position,
                        reason: "record hash disagrees with index".to_string(),
                    });
                }
                Ok(block)
            }
            Err((reason, _)) => Err(StoreError::CorruptRecord {
                offset: entry.position,
                reason,
            }),
        }
    }

    /// Rebuild index entries by scanning the chain file.
    pub(crate) fn scan_entries(
        path: &Path,
        key: Option<&[u8; 32]>,
    ) -> Result<Vec<IndexEntry>, StoreError> {
        let mut file = File::open(path)?;
        let mut header = vec![0u8; HEADER_LEN];
        let read = file.read(&mut header)?;
        check_header(&header[..read])?;

        let file_len = fs::metadata(path)?.len();
        let mut entries = Vec::new();
        let mut offset = HEADER_LEN as u64;
        while offset < file_len {
            match read_record(&mut file, offset, key) {
                Ok((block, consumed)) => {
                    entries.push(IndexEntry {
                        height: block.height,
                        position: offset,
                        size: (consumed - RECORD_PREFIX_LEN as u64) as u32,
                        hash: block.hash,
                        timestamp: block.timestamp,
                        tx_count: block.tx_count,
                    });
                    offset += consumed;
                }
                Err((reason, _)) => {
                    return Err(StoreError::CorruptRecord { offset, reason });
                }
            }
        }
        Ok(entries)
    }
}

/// Read one record at `offset`. On success returns the block and the
/// total bytes consumed. On failure returns the reason and, when the
/// framing was intact, the bytes to skip.
pub(crate) fn read_record(
    file: &mut File,
    offset: u64,
    key: Option<&[u8; 32]>,
) -> Result<(Block, u64), (String, Option<u64>)> {
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| (format!("seek failed: {e}"), None))?;

    let mut prefix = [0u8; RECORD_PREFIX_LEN];
    file.read_exact(&mut prefix)
        .map_err(|e| (format!("truncated record prefix: {e}"), None))?;

    let size = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    let crc = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
    let flags = prefix[8];

    let mut payload = vec![0u8; size];
    file.read_exact(&mut payload)
        .map_err(|e| (format!("truncated record payload: {e}"), None))?;

    let consumed = (RECORD_PREFIX_LEN + size) as u64;
    match decode_payload(&payload, flags, crc, offset, key) {
        Ok(block) => Ok((block, consumed)),
        Err(e) => Err((e.to_string(), Some(consumed))),
    }
}
