//! # Producer Selection
//!
//! Selection is a pluggable capability. The default implementation is
//! stake-weighted and deterministic: every node evaluating the same
//! height, parent hash, and validator set agrees on the producer.

use sha2::{Digest, Sha256};

use shared_types::{Address, Hash, Validator};

/// Chooses the validator authorized to produce at a height.
pub trait ProducerSelector: Send + Sync {
    /// The producer for `height`, or `None` when no active validator
    /// exists. `parent_hash` seeds the draw.
    fn select_producer(
        &self,
        height: u64,
        parent_hash: &Hash,
        validators: &[Validator],
    ) -> Option<Address>;
}

/// Deterministic stake-weighted draw seeded by (height, parent hash).
#[derive(Debug, Clone, Copy, Default)]
pub struct StakeWeightedSelector;

impl ProducerSelector for StakeWeightedSelector {
    fn select_producer(
        &self,
        height: u64,
        parent_hash: &Hash,
        validators: &[Validator],
    ) -> Option<Address> {
        // Stable candidate order regardless of input order.
        let mut active: Vec<&Validator> = validators.iter().filter(|v| v.is_active()).collect();
        if active.is_empty() {
            return None;
        }
        active.sort_by_key(|v| v.address);

        let total_stake: u128 = active.iter().map(|v| u128::from(v.stake)).sum();
        if total_stake == 0 {
            // All stakes zero: uniform draw over the sorted set.
            let seed = draw(height, parent_hash);
            return Some(active[(seed % active.len() as u128) as usize].address);
        }

        let mut point = draw(height, parent_hash) % total_stake;
        for validator in &active {
            let stake = u128::from(validator.stake);
            if point < stake {
                return Some(validator.address);
            }
            point -= stake;
        }
        // Unreachable: point < total_stake by construction.
        Some(active[0].address)
    }
}

fn draw(height: u64, parent_hash: &Hash) -> u128 {
    let mut hasher = Sha256::new();
    hasher.update(height.to_be_bytes());
    hasher.update(parent_hash);
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    u128::from_be_bytes(bytes)
}
