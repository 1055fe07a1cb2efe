//! Mempool entry and configuration types.

use serde::{Deserialize, Serialize};

use shared_types::{Hash, Transaction};

/// Weights for the priority score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityWeights {
    pub gas_price: u64,
    pub fee: u64,
    /// Score added per second of age.
    pub age_per_second: u64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            gas_price: 10,
            fee: 100,
            age_per_second: 1,
        }
    }
}

/// Mempool configuration.
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// Maximum live entries.
    pub max_transactions: usize,
    /// Maximum pending entries per sender.
    pub max_per_account: usize,
    /// Minimum fee for admission.
    pub min_fee: u64,
    /// Reduced floor accepted while the node is catching up.
    pub sync_fee_floor: u64,
    /// Entry time-to-live in seconds.
    pub entry_ttl_secs: u64,
    /// Hard age cap in seconds.
    pub max_age_secs: u64,
    pub weights: PriorityWeights,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_transactions: 10_000,
            max_per_account: 64,
            min_fee: 1,
            sync_fee_floor: 0,
            entry_ttl_secs: 3_600,
            max_age_secs: 24 * 3_600,
            weights: PriorityWeights::default(),
        }
    }
}

/// A pooled transaction with its scheduling metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MempoolEntry {
    pub transaction: Transaction,
    pub priority_score: u128,
    pub arrival_time: u64,
    pub expires_at: u64,
    pub retry_count: u32,
}

impl MempoolEntry {
    /// Build an entry at `now`, computing its admission-time score.
    pub fn new(transaction: Transaction, now: u64, config: &MempoolConfig) -> Self {
        let mut entry = Self {
            transaction,
            priority_score: 0,
            arrival_time: now,
            expires_at: now + config.entry_ttl_secs,
            retry_count: 0,
        };
        entry.priority_score = entry.score_at(now, &config.weights);
        entry
    }

    /// Weighted sum of gas price, fee, and an age bonus.
    pub fn score_at(&self, now: u64, weights: &PriorityWeights) -> u128 {
        let age = now.saturating_sub(self.arrival_time);
        u128::from(self.transaction.gas_price) * u128::from(weights.gas_price)
            + u128::from(self.transaction.fee) * u128::from(weights.fee)
            + u128::from(age) * u128::from(weights.age_per_second)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at < now
    }

    pub fn hash(&self) -> Hash {
        self.transaction.hash
    }
}

/// Priority-set key: ordered by score, hash as the tiebreaker so the
/// set never loses entries with equal scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PriorityKey {
    pub score: u128,
    pub hash: Hash,
}

impl PriorityKey {
    pub fn of(entry: &MempoolEntry) -> Self {
        Self {
            score: entry.priority_score,
            hash: entry.transaction.hash,
        }
    }
}
