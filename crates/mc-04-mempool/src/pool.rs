//! # Transaction Pool
//!
//! The pure pool structure: admission, replace-by-fee, eviction, block
//! selection, and maintenance. The pool itself is lock-free; the
//! [`crate::service::Mempool`] wrapper owns the mutex and the event
//! emission.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use shared_types::{Address, Hash, Transaction, TransactionVerifier};

use crate::entities::{MempoolConfig, MempoolEntry, PriorityKey};
use crate::errors::MempoolError;

/// Result of a successful `add`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// Inserted; `evicted` carries the hash displaced by a full pool.
    Added { evicted: Option<Hash> },
    /// Replaced an existing `(sender, nonce)` entry via RBF.
    Replaced { replaced: Hash },
}

/// A nonce-contiguity violation for one sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceGap {
    pub address: Address,
    pub confirmed: u64,
    pub missing_nonce: u64,
}

/// Priority-ordered pending pool with hash and sender indices.
#[derive(Debug)]
pub struct TransactionPool {
    config: MempoolConfig,
    by_hash: HashMap<Hash, MempoolEntry>,
    by_priority: BTreeSet<PriorityKey>,
    by_sender: HashMap<Address, BTreeMap<u64, Hash>>,
    sync_mode: bool,
}

impl TransactionPool {
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            by_hash: HashMap::new(),
            by_priority: BTreeSet::new(),
            by_sender: HashMap::new(),
            sync_mode: false,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(MempoolConfig::default())
    }

    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash) -> Option<&MempoolEntry> {
        self.by_hash.get(hash)
    }

    /// Reduced fee floor while the node is catching up with the network.
    pub fn set_sync_mode(&mut self, on: bool) {
        self.sync_mode = on;
    }

    fn fee_floor(&self) -> u64 {
        if self.sync_mode {
            self.config.sync_fee_floor
        } else {
            self.config.min_fee
        }
    }

    /// Admit a transaction.
    ///
    /// # Errors
    ///
    /// - `Invalid` for structural or signature faults
    /// - `FeeTooLow` below the current floor
    /// - `DuplicateTransaction` for a known hash
    /// - `NonceNotReachable` when the nonce does not extend the sender's
    ///   pending sequence
    /// - `ReplacementUnderpriced` / `ReplacementSignerMismatch` for a
    ///   failed RBF
    /// - `AccountLimitReached` at the per-sender cap
    pub fn add(
        &mut self,
        tx: Transaction,
        now: u64,
        verifier: &dyn TransactionVerifier,
        confirmed_nonce: u64,
    ) -> Result<AddOutcome, MempoolError> {
        tx.validate(verifier)?;

        let floor = self.fee_floor();
        if tx.fee < floor {
            return Err(MempoolError::FeeTooLow {
                fee: tx.fee,
                minimum: floor,
            });
        }
        if self.by_hash.contains_key(&tx.hash) {
            return Err(MempoolError::DuplicateTransaction(tx.hash));
        }

        if tx.nonce <= confirmed_nonce {
            return Err(MempoolError::NonceNotReachable {
                address: tx.from,
                confirmed: confirmed_nonce,
                nonce: tx.nonce,
            });
        }

        // A live entry at the same (sender, nonce) is the RBF path.
        if let Some(existing_hash) = self
            .by_sender
            .get(&tx.from)
            .and_then(|nonces| nonces.get(&tx.nonce))
            .copied()
        {
            return self.replace(existing_hash, tx, now, verifier);
        }

        let pending = self.by_sender.get(&tx.from).map(|m| m.len()).unwrap_or(0);
        if tx.nonce > confirmed_nonce + 1 + pending as u64 {
            return Err(MempoolError::NonceNotReachable {
                address: tx.from,
                confirmed: confirmed_nonce,
                nonce: tx.nonce,
            });
        }
        if pending >= self.config.max_per_account {
            return Err(MempoolError::AccountLimitReached {
                address: tx.from,
                limit: self.config.max_per_account,
            });
        }

        let mut evicted = None;
        if self.by_hash.len() >= self.config.max_transactions {
            evicted = self.evict_lowest();
        }

        self.insert_entry(MempoolEntry::new(tx, now, &self.config));
        Ok(AddOutcome::Added { evicted })
    }

    fn replace(
        &mut self,
        existing_hash: Hash,
        tx: Transaction,
        now: u64,
        verifier: &dyn TransactionVerifier,
    ) -> Result<AddOutcome, MempoolError> {
        let existing = self
            .by_hash
            .get(&existing_hash)
            .ok_or(MempoolError::TransactionNotFound(existing_hash))?;

        if tx.fee <= existing.transaction.fee {
            return Err(MempoolError::ReplacementUnderpriced {
                existing_fee: existing.transaction.fee,
                offered_fee: tx.fee,
            });
        }

        // Both signatures must recover to the same signer.
        let old_signer = existing
            .transaction
            .signature
            .as_deref()
            .and_then(|sig| verifier.recover(&existing.transaction.signing_digest(), sig));
        let new_signer = tx
            .signature
            .as_deref()
            .and_then(|sig| verifier.recover(&tx.signing_digest(), sig));
        match (old_signer, new_signer) {
            (Some(a), Some(b)) if a == b => {}
            _ => return Err(MempoolError::ReplacementSignerMismatch),
        }

        self.remove(&existing_hash);
        self.insert_entry(MempoolEntry::new(tx, now, &self.config));
        Ok(AddOutcome::Replaced {
            replaced: existing_hash,
        })
    }

    fn insert_entry(&mut self, entry: MempoolEntry) {
        self.by_priority.insert(PriorityKey::of(&entry));
        self.by_sender
            .entry(entry.transaction.from)
            .or_default()
            .insert(entry.transaction.nonce, entry.transaction.hash);
        self.by_hash.insert(entry.transaction.hash, entry);
    }

    /// Remove an entry (after inclusion or on maintenance).
    pub fn remove(&mut self, hash: &Hash) -> Option<MempoolEntry> {
        let entry = self.by_hash.remove(hash)?;
        self.by_priority.remove(&PriorityKey::of(&entry));
        if let Some(nonces) = self.by_sender.get_mut(&entry.transaction.from) {
            nonces.remove(&entry.transaction.nonce);
            if nonces.is_empty() {
                self.by_sender.remove(&entry.transaction.from);
            }
        }
        Some(entry)
    }

    fn evict_lowest(&mut self) -> Option<Hash> {
        let lowest = self.by_priority.iter().next().copied()?;
        self.remove(&lowest.hash);
        Some(lowest.hash)
    }

    /// Read-only preview of the best transactions for the next block:
    /// priority order, skipping expired and zero-amount entries, keeping
    /// per-sender nonce order, and accumulating gas up to `max_gas`.
    pub fn get_for_block(&self, max_count: usize, max_gas: u64, now: u64) -> Vec<Transaction> {
        let mut selected: Vec<Transaction> = Vec::new();
        let mut selected_hashes: HashSet<Hash> = HashSet::new();
        let mut gas_used = 0u64;

        for key in self.by_priority.iter().rev() {
            if selected.len() >= max_count {
                break;
            }
            let Some(entry) = self.by_hash.get(&key.hash) else {
                continue;
            };
            let tx = &entry.transaction;
            if entry.is_expired(now) || tx.amount == 0 {
                continue;
            }
            // Keep sender nonce order: every lower pending nonce must
            // already be in the selection.
            let sender_ready = self
                .by_sender
                .get(&tx.from)
                .map(|nonces| {
                    nonces
                        .range(..tx.nonce)
                        .all(|(_, h)| selected_hashes.contains(h))
                })
                .unwrap_or(true);
            if !sender_ready {
                continue;
            }
            if gas_used.saturating_add(tx.gas_limit) > max_gas {
                continue;
            }
            gas_used += tx.gas_limit;
            selected_hashes.insert(tx.hash);
            selected.push(tx.clone());
        }
        selected
    }

    /// Remove expired, over-age, and no-longer-valid entries. Returns
    /// the removed entries for event emission.
    pub fn cleanup(
        &mut self,
        now: u64,
        verifier: &dyn TransactionVerifier,
        confirmed_nonce_of: &dyn Fn(&Address) -> u64,
    ) -> Vec<MempoolEntry> {
        let stale: Vec<Hash> = self
            .by_hash
            .values()
            .filter(|entry| {
                entry.is_expired(now)
                    || now.saturating_sub(entry.arrival_time) > self.config.max_age_secs
                    || entry.transaction.validate(verifier).is_err()
                    || entry.transaction.nonce <= confirmed_nonce_of(&entry.transaction.from)
            })
            .map(|entry| entry.transaction.hash)
            .collect();

        stale
            .iter()
            .filter_map(|hash| self.remove(hash))
            .collect()
    }

    /// Recompute priority scores so the age bonus keeps accruing.
    pub fn refresh_priorities(&mut self, now: u64) {
        let weights = self.config.weights;
        self.by_priority.clear();
        for entry in self.by_hash.values_mut() {
            entry.priority_score = entry.score_at(now, &weights);
        }
        for entry in self.by_hash.values() {
            self.by_priority.insert(PriorityKey::of(entry));
        }
    }

    /// Group by `(sender, nonce)` and report any key holding more than
    /// one transaction.
    pub fn detect_double_spends(&self) -> Vec<(Address, u64, Vec<Hash>)> {
        let mut groups: HashMap<(Address, u64), Vec<Hash>> = HashMap::new();
        for entry in self.by_hash.values() {
            groups
                .entry((entry.transaction.from, entry.transaction.nonce))
                .or_default()
                .push(entry.transaction.hash);
        }
        let mut out: Vec<(Address, u64, Vec<Hash>)> = groups
            .into_iter()
            .filter(|(_, hashes)| hashes.len() > 1)
            .map(|((address, nonce), hashes)| (address, nonce, hashes))
            .collect();
        out.sort_by_key(|(address, nonce, _)| (*address, *nonce));
        out
    }

    /// For every sender, pending nonces must be contiguous with the
    /// confirmed nonce.
    pub fn validate_nonce_gaps(&self, confirmed_nonce_of: &dyn Fn(&Address) -> u64) -> Vec<NonceGap> {
        let mut gaps = Vec::new();
        for (address, nonces) in &self.by_sender {
            let confirmed = confirmed_nonce_of(address);
            let mut expected = confirmed + 1;
            for nonce in nonces.keys() {
                if *nonce != expected {
                    gaps.push(NonceGap {
                        address: *address,
                        confirmed,
                        missing_nonce: expected,
                    });
                    break;
                }
                expected += 1;
            }
        }
        gaps.sort_by_key(|g| g.address);
        gaps
    }

    /// Snapshot of all entries, for persistence.
    pub fn snapshot(&self) -> Vec<MempoolEntry> {
        self.by_hash.values().cloned().collect()
    }
}
