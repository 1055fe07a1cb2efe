//! # Fork Resolution
//!
//! On a fork report: poll peers for their hash at the disputed height,
//! and when a supermajority disagrees with the local chain, find the
//! common ancestor by binary search over heights, roll the ledger back,
//! truncate the orphaned tail, and re-apply the majority chain.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use mc_02_chain_store::ChainStore;
use mc_03_ledger_db::LedgerDb;
use mc_06_production::{chain_weight, prefer_remote, BlockValidator};
use shared_types::{Block, BlockHeader, Hash};

use crate::client::SyncClient;
use crate::config::SyncConfig;
use crate::errors::SyncError;

/// Result of a fork check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForkOutcome {
    /// The local chain is canonical (or the report was unfounded).
    LocalCanonical,
    /// The majority chain replaced the local tail.
    Reorganized { common_ancestor: u64, applied: u64 },
}

/// Resolves competing chains.
pub struct ForkResolver {
    config: SyncConfig,
    chain: Arc<ChainStore>,
    ledger: Arc<LedgerDb>,
    validator: Arc<BlockValidator>,
    client: Arc<SyncClient>,
}

impl ForkResolver {
    pub fn new(
        config: SyncConfig,
        chain: Arc<ChainStore>,
        ledger: Arc<LedgerDb>,
        validator: Arc<BlockValidator>,
        client: Arc<SyncClient>,
    ) -> Self {
        Self {
            config,
            chain,
            ledger,
            validator,
            client,
        }
    }

    /// Handle a `fork.detected` report.
    pub async fn resolve(
        &self,
        fork_height: u64,
        remote_hash: Hash,
    ) -> Result<ForkOutcome, SyncError> {
        let local_block = match self.chain.get(fork_height) {
            Ok(block) => block,
            // Nothing at that height locally: this is a gap, not a fork.
            Err(_) => return Ok(ForkOutcome::LocalCanonical),
        };
        if local_block.hash == remote_hash {
            return Ok(ForkOutcome::LocalCanonical);
        }

        // Poll every eligible peer for its hash at the disputed height.
        let peers = self.client.failover().balancer().eligible();
        if peers.is_empty() {
            return Ok(ForkOutcome::LocalCanonical);
        }
        let mut votes: HashMap<Hash, Vec<usize>> = HashMap::new();
        for (index, peer) in peers.iter().enumerate() {
            match self.client.fork_check_peer(peer, fork_height).await {
                Ok(hash) => votes.entry(hash).or_default().push(index),
                Err(e) => warn!(peer = %peer.node_id, error = %e, "fork poll failed"),
            }
        }

        let total_votes: usize = votes.values().map(Vec::len).sum();
        let Some((majority_hash, majority_voters)) = votes
            .iter()
            .max_by_key(|(_, voters)| voters.len())
            .map(|(hash, voters)| (*hash, voters.clone()))
        else {
            return Ok(ForkOutcome::LocalCanonical);
        };

        let quorum_met = total_votes > 0
            && majority_voters.len() as f64 / total_votes as f64 >= self.config.fork_quorum;
        if !quorum_met || majority_hash == local_block.hash {
            info!(fork_height, "local chain confirmed by peers");
            return Ok(ForkOutcome::LocalCanonical);
        }

        self.ledger.append_monitoring(
            "alert_raised",
            "supermajority disagrees with local chain",
            serde_json::json!({
                "fork_height": fork_height,
                "local_hash": shared_types::normalize::format_hash(&local_block.hash),
                "remote_hash": shared_types::normalize::format_hash(&majority_hash),
                "votes": majority_voters.len(),
                "total": total_votes,
            }),
            shared_types::clock::now_unix(),
        )?;

        // Use the first majority voter for ancestor search and download.
        let reference_peer = peers[majority_voters[0]].clone();

        let ancestor = self
            .find_common_ancestor(&reference_peer, fork_height)
            .await?;

        // Download the majority chain and confirm it actually outweighs
        // the local tail before touching any store.
        let local_tip = self.chain.tip().map(|(h, _)| h).unwrap_or(fork_height);
        let remote_tip = self
            .client
            .remote_max_height()
            .await
            .unwrap_or(fork_height)
            .max(fork_height);
        let remote_blocks = self.client.fetch_range(ancestor + 1, remote_tip).await?;

        let stakes: HashMap<shared_types::Address, u64> = self
            .ledger
            .validators()?
            .into_iter()
            .map(|v| (v.address, v.stake))
            .collect();
        let stake_of = |address: &shared_types::Address| stakes.get(address).copied().unwrap_or(0);

        let local_headers = self.local_headers(ancestor + 1, local_tip)?;
        let remote_headers: Vec<BlockHeader> = remote_blocks.iter().map(Block::header).collect();
        if !prefer_remote(
            chain_weight(&local_headers, &stake_of),
            chain_weight(&remote_headers, &stake_of),
        ) {
            info!(fork_height, "local chain outweighs the remote fork");
            return Ok(ForkOutcome::LocalCanonical);
        }

        // Majority chain wins: roll back and re-apply.
        self.ledger.rollback_to_height(ancestor)?;
        let orphaned = self.chain.truncate_to(ancestor)?;
        self.ledger.append_monitoring(
            "fork_reorganized",
            "orphaned local tail replaced by majority chain",
            serde_json::json!({
                "common_ancestor": ancestor,
                "orphaned": orphaned
                    .iter()
                    .map(shared_types::normalize::format_hash)
                    .collect::<Vec<_>>(),
            }),
            shared_types::clock::now_unix(),
        )?;

        let mut applied = 0u64;
        for block in &remote_blocks {
            self.validator
                .validate_and_apply(block)
                .await
                .map_err(|e| SyncError::BlockRejected {
                    height: block.height,
                    reason: e.to_string(),
                })?;
            applied += 1;
        }

        info!(common_ancestor = ancestor, applied, "fork resolved");
        Ok(ForkOutcome::Reorganized {
            common_ancestor: ancestor,
            applied,
        })
    }

    /// Binary search for the highest height where the reference peer's
    /// hash matches ours.
    async fn find_common_ancestor(
        &self,
        peer: &mc_01_peer_health::PeerSnapshot,
        fork_height: u64,
    ) -> Result<u64, SyncError> {
        if fork_height == 0 {
            return Err(SyncError::NoCommonAncestor { height: 0 });
        }
        let mut lo = 0u64;
        let mut hi = fork_height - 1;
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            let local_hash = self
                .chain
                .get(mid)
                .map(|b| b.hash)
                .map_err(|_| SyncError::NoCommonAncestor { height: fork_height })?;
            let remote_hash = self
                .client
                .fork_check_peer(peer, mid)
                .await
                .map_err(SyncError::PeerNet)?;
            if local_hash == remote_hash {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }

        // Confirm agreement at the candidate height.
        let local_hash = self
            .chain
            .get(lo)
            .map(|b| b.hash)
            .map_err(|_| SyncError::NoCommonAncestor { height: fork_height })?;
        let remote_hash = self
            .client
            .fork_check_peer(peer, lo)
            .await
            .map_err(SyncError::PeerNet)?;
        if local_hash != remote_hash {
            return Err(SyncError::NoCommonAncestor {
                height: fork_height,
            });
        }
        Ok(lo)
    }

    fn local_headers(&self, start: u64, end: u64) -> Result<Vec<BlockHeader>, SyncError> {
        let mut headers = Vec::new();
        for height in start..=end {
            match self.chain.get(height) {
                Ok(block) => headers.push(block.header()),
                Err(_) => break,
            }
        }
        Ok(headers)
    }
}
