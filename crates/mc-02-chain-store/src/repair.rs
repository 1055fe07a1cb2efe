//! # Chain File Repair
//!
//! Salvages every readable record into a fresh file, in order, and
//! rebuilds the index. Unreadable records are dropped; once the record
//! framing itself is broken the remainder of the file is unreachable
//! and everything after the break is lost.

use std::fs::{self, File};
use std::io::{Read, Write};

use tracing::{info, warn};

use shared_types::{Block, Hash};

use crate::config::StoreConfig;
use crate::errors::StoreError;
use crate::format::{check_header, encode_header, encode_record, HEADER_LEN};
use crate::index;
use crate::store::{read_record, ChainStore};

/// Outcome of a repair pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairReport {
    /// Blocks salvaged into the new file.
    pub recovered: u64,
    /// Records dropped as unreadable or inconsistent.
    pub dropped: u64,
}

impl ChainStore {
    /// Rewrite the chain file keeping only readable, chain-consistent
    /// records, then rebuild the index.
    pub fn repair(&self) -> Result<RepairReport, StoreError> {
        self.locked_rewrite(repair_files)
    }

    /// Rewrite the chain file keeping only blocks at or below `height`.
    /// Used by fork resolution to drop an orphaned tail. Returns the
    /// hashes of the dropped blocks, tip-first.
    pub fn truncate_to(&self, height: u64) -> Result<Vec<Hash>, StoreError> {
        self.locked_rewrite(|config| truncate_files(config, height))
    }
}

fn truncate_files(config: &StoreConfig, height: u64) -> Result<Vec<Hash>, StoreError> {
    let path = config.chain_path();
    let key = config.encryption_key.as_ref();

    let entries = ChainStore::scan_entries(&path, key)?;
    let (kept, dropped): (Vec<_>, Vec<_>) = entries.iter().partition(|e| e.height <= height);
    if dropped.is_empty() {
        return Ok(Vec::new());
    }

    let mut file = File::open(&path)?;
    let tmp_path = config.tmp_dir().join("truncate.bin");
    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&encode_header(shared_types::clock::now_unix() as u32))?;
        for entry in &kept {
            match read_record(&mut file, entry.position, key) {
                Ok((block, _)) => tmp.write_all(&encode_record(&block, key)?)?,
                Err((reason, _)) => {
                    return Err(StoreError::CorruptRecord {
                        offset: entry.position,
                        reason,
                    })
                }
            }
        }
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, &path)?;

    let new_entries = ChainStore::scan_entries(&path, key)?;
    index::rewrite(&config.index_path(), &new_entries)?;

    let mut orphaned: Vec<Hash> = dropped.iter().map(|e| e.hash).collect();
    orphaned.reverse();
    warn!(height, dropped = orphaned.len(), "chain file truncated");
    Ok(orphaned)
}

fn repair_files(config: &StoreConfig) -> Result<RepairReport, StoreError> {
    let path = config.chain_path();
    let key = config.encryption_key.as_ref();

    let mut file = File::open(&path)?;
    let mut header = vec![0u8; HEADER_LEN];
    let read = file.read(&mut header)?;
    if check_header(&header[..read]).is_err() {
        warn!("chain file header unreadable; repair starts from an empty file");
    }

    let file_len = fs::metadata(&path)?.len();
    let mut offset = HEADER_LEN as u64;
    let mut recovered: Vec<Block> = Vec::new();
    let mut dropped = 0u64;
    let mut expected_parent: Option<Hash> = None;

    while offset < file_len {
        match read_record(&mut file, offset, key) {
            Ok((block, consumed)) => {
                offset += consumed;
                let chains = match &expected_parent {
                    Some(parent_hash) => block.parent_hash == *parent_hash,
                    None => true,
                };
                if block.compute_hash() == block.hash && chains {
                    expected_parent = Some(block.hash);
                    recovered.push(block);
                } else {
                    dropped += 1;
                    warn!(height = block.height, offset, "dropping inconsistent record");
                }
            }
            Err((reason, consumed)) => {
                dropped += 1;
                warn!(offset, reason, "dropping unreadable record");
                match consumed {
                    Some(consumed) => offset += consumed,
                    None => break,
                }
            }
        }
    }

    // Write the salvaged chain to a scratch file, then swap it in.
    let tmp_path = config.tmp_dir().join("repair.bin");
    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&encode_header(shared_types::clock::now_unix() as u32))?;
        for block in &recovered {
            tmp.write_all(&encode_record(block, key)?)?;
        }
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, &path)?;

    let entries = ChainStore::scan_entries(&path, key)?;
    index::rewrite(&config.index_path(), &entries)?;

    let report = RepairReport {
        recovered: recovered.len() as u64,
        dropped,
    };
    info!(recovered = report.recovered, dropped = report.dropped, "chain file repaired");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AppendOutcome;
    use shared_types::Address;
    use std::fs::OpenOptions;
    use std::io::{Seek, SeekFrom};

    fn chain(n: u64) -> Vec<Block> {
        let validator = Address([9; 20]);
        let mut blocks = vec![Block::genesis(1_700_000_000, validator)];
        for height in 1..n {
            let parent = &blocks[blocks.len() - 1];
            blocks.push(Block::assemble(
                height,
                parent.hash,
                parent.timestamp + 10,
                validator,
                vec![],
            ));
        }
        blocks
    }

    #[test]
    fn test_repair_noop_on_clean_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(StoreConfig::new(dir.path())).unwrap();
        for block in chain(4) {
            store.append(&block).unwrap();
        }
        let report = store.repair().unwrap();
        assert_eq!(report.recovered, 4);
        assert_eq!(report.dropped, 0);
        assert_eq!(store.tip().unwrap().0, 3);
    }

    #[test]
    fn test_repair_salvages_prefix_after_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(StoreConfig::new(dir.path())).unwrap();
        for block in chain(5) {
            store.append(&block).unwrap();
        }

        // Corrupt the payload of the fourth record.
        let entries = store.index_snapshot();
        let target = entries[3].position + 12;
        let mut file = OpenOptions::new()
            .write(true)
            .open(dir.path().join("blockchain.bin"))
            .unwrap();
        file.seek(SeekFrom::Start(target)).unwrap();
        file.write_all(&[0xFF, 0xFF, 0xFF, 0xFF]).unwrap();
        drop(file);

        let report = store.repair().unwrap();
        assert!(report.dropped >= 1);
        assert_eq!(store.tip().unwrap().0, 4 - report.dropped);
        assert!(store.validate_file().unwrap().is_clean());
        assert!(store.validate_chain().unwrap().is_clean());
    }

    #[test]
    fn test_truncate_drops_tail() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(StoreConfig::new(dir.path())).unwrap();
        for block in chain(6) {
            store.append(&block).unwrap();
        }
        let orphaned = store.truncate_to(3).unwrap();
        assert_eq!(orphaned.len(), 2);
        assert_eq!(store.tip().unwrap().0, 3);
        assert!(store.validate_chain().unwrap().is_clean());
        // Truncating at or above the tip is a no-op.
        assert!(store.truncate_to(10).unwrap().is_empty());
    }

    #[test]
    fn test_store_usable_after_repair() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(StoreConfig::new(dir.path())).unwrap();
        let blocks = chain(6);
        for block in &blocks[..4] {
            store.append(block).unwrap();
        }
        store.repair().unwrap();
        assert_eq!(store.append(&blocks[4]).unwrap(), AppendOutcome::Appended);
        assert_eq!(store.tip().unwrap().0, 4);
    }
}
