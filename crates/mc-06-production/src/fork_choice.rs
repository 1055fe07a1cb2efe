//! # Fork Choice
//!
//! When two valid chains compete, the canonical one carries the greater
//! cumulative validator stake; ties break to the lower tip hash.

use shared_types::{Address, BlockHeader, Hash};

/// Comparable weight of one candidate chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainWeight {
    pub cumulative_stake: u128,
    pub tip_hash: Hash,
}

/// Fold a chain segment into its weight: the sum of each producing
/// validator's stake, as reported by `stake_of`.
pub fn chain_weight(headers: &[BlockHeader], stake_of: &dyn Fn(&Address) -> u64) -> ChainWeight {
    let cumulative_stake = headers
        .iter()
        .map(|h| u128::from(stake_of(&h.validator)))
        .sum();
    ChainWeight {
        cumulative_stake,
        tip_hash: headers.last().map(|h| h.hash).unwrap_or([0u8; 32]),
    }
}

/// Whether the remote candidate should replace the local chain.
pub fn prefer_remote(local: ChainWeight, remote: ChainWeight) -> bool {
    match remote.cumulative_stake.cmp(&local.cumulative_stake) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => remote.tip_hash < local.tip_hash,
    }
}
