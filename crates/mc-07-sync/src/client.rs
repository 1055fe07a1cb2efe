//! # Sync RPC Client
//!
//! Outbound calls to peers' sync endpoints. Most operations route
//! through the failover executor; fork polls address specific peers
//! directly because every vote matters.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use mc_01_peer_health::{FailoverExecutor, PeerNetError, PeerSnapshot};
use shared_types::{normalize, Block, BlockHeader, Hash, StateSnapshot};

use crate::config::SyncConfig;
use crate::errors::SyncError;

#[derive(Debug, Deserialize)]
struct RangeResponse {
    blocks: Vec<Block>,
}

#[derive(Debug, Deserialize)]
struct HashResponse {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct HeadersResponse {
    headers: Vec<BlockHeader>,
}

/// HTTP client for the node-to-node sync protocol.
pub struct SyncClient {
    client: reqwest::Client,
    failover: Arc<FailoverExecutor>,
    config: SyncConfig,
    node_id: String,
}

impl SyncClient {
    pub fn new(failover: Arc<FailoverExecutor>, config: SyncConfig, node_id: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            failover,
            config,
            node_id,
        }
    }

    pub fn failover(&self) -> &Arc<FailoverExecutor> {
        &self.failover
    }

    /// Download `start..=end` from the best peer.
    pub async fn fetch_range(&self, start: u64, end: u64) -> Result<Vec<Block>, SyncError> {
        let client = self.client.clone();
        let requester = self.node_id.clone();
        let timeout = self.config.batch_timeout;
        let blocks = self
            .failover
            .execute("block_range", move |peer: PeerSnapshot| {
                let client = client.clone();
                let requester = requester.clone();
                async move {
                    let response = client
                        .post(format!("{}/sync/range", peer.url))
                        .timeout(timeout)
                        .json(&json!({
                            "start_height": start,
                            "end_height": end,
                            "requester_node": requester,
                        }))
                        .send()
                        .await
                        .map_err(|e| request_failed(&peer.node_id, e))?;
                    let body: RangeResponse = response
                        .error_for_status()
                        .map_err(|e| request_failed(&peer.node_id, e))?
                        .json()
                        .await
                        .map_err(|e| invalid_response(&peer.node_id, e))?;
                    Ok(body.blocks)
                }
            })
            .await?;

        let expected = (end - start + 1) as usize;
        if blocks.len() != expected {
            return Err(SyncError::IncompleteRange {
                start,
                end,
                got: blocks.len(),
            });
        }
        debug!(start, end, "range downloaded");
        Ok(blocks)
    }

    /// Fetch a single block by height.
    pub async fn fetch_block(&self, height: u64) -> Result<Block, SyncError> {
        let client = self.client.clone();
        let timeout = self.config.block_fetch_timeout;
        let block = self
            .failover
            .execute("block_fetch", move |peer: PeerSnapshot| {
                let client = client.clone();
                async move {
                    let response = client
                        .get(format!("{}/block", peer.url))
                        .query(&[("height", height)])
                        .timeout(timeout)
                        .send()
                        .await
                        .map_err(|e| request_failed(&peer.node_id, e))?;
                    response
                        .error_for_status()
                        .map_err(|e| request_failed(&peer.node_id, e))?
                        .json::<Block>()
                        .await
                        .map_err(|e| invalid_response(&peer.node_id, e))
                }
            })
            .await?;
        Ok(block)
    }

    /// Fetch ordered headers for light sync.
    pub async fn fetch_headers(&self, start: u64, end: u64) -> Result<Vec<BlockHeader>, SyncError> {
        let client = self.client.clone();
        let timeout = self.config.batch_timeout;
        let headers = self
            .failover
            .execute("header_fetch", move |peer: PeerSnapshot| {
                let client = client.clone();
                async move {
                    let response = client
                        .get(format!("{}/sync/headers", peer.url))
                        .query(&[("start", start), ("end", end)])
                        .timeout(timeout)
                        .send()
                        .await
                        .map_err(|e| request_failed(&peer.node_id, e))?;
                    let body: HeadersResponse = response
                        .error_for_status()
                        .map_err(|e| request_failed(&peer.node_id, e))?
                        .json()
                        .await
                        .map_err(|e| invalid_response(&peer.node_id, e))?;
                    Ok(body.headers)
                }
            })
            .await?;
        Ok(headers)
    }

    /// Download and verify a state snapshot at `height`.
    pub async fn fetch_snapshot(&self, height: u64) -> Result<StateSnapshot, SyncError> {
        let client = self.client.clone();
        let timeout = self.config.snapshot_timeout;
        let bytes = self
            .failover
            .execute("snapshot_download", move |peer: PeerSnapshot| {
                let client = client.clone();
                async move {
                    let response = client
                        .get(format!("{}/sync/snapshot", peer.url))
                        .query(&[("height", height)])
                        .timeout(timeout)
                        .send()
                        .await
                        .map_err(|e| request_failed(&peer.node_id, e))?;
                    response
                        .error_for_status()
                        .map_err(|e| request_failed(&peer.node_id, e))?
                        .bytes()
                        .await
                        .map_err(|e| invalid_response(&peer.node_id, e))
                }
            })
            .await?;

        let snapshot: StateSnapshot = bincode::deserialize(&bytes)
            .map_err(|e| SyncError::SnapshotDecode(e.to_string()))?;
        if snapshot.compute_state_root() != snapshot.state_root {
            return Err(SyncError::SnapshotInvalid { height });
        }
        Ok(snapshot)
    }

    /// Best tip height among eligible peers, from their status payloads.
    pub async fn remote_max_height(&self) -> Option<u64> {
        let peers = self.failover.balancer().eligible();
        let mut best = None;
        for peer in peers {
            if let Ok(response) = self
                .client
                .get(format!("{}/status", peer.url))
                .timeout(Duration::from_secs(3))
                .send()
                .await
            {
                if let Ok(value) = response.json::<serde_json::Value>().await {
                    if let Some(height) = value.get("tip_height").and_then(|h| h.as_u64()) {
                        best = Some(best.map_or(height, |b: u64| b.max(height)));
                    }
                }
            }
        }
        best
    }

    /// Ask one specific peer for its hash at `height`.
    pub async fn fork_check_peer(
        &self,
        peer: &PeerSnapshot,
        height: u64,
    ) -> Result<Hash, PeerNetError> {
        let response = self
            .client
            .post(format!("{}/sync/fork_check", peer.url))
            .timeout(self.config.block_fetch_timeout)
            .json(&json!({ "height": height }))
            .send()
            .await
            .map_err(|e| request_failed(&peer.node_id, e))?;
        let body: HashResponse = response
            .error_for_status()
            .map_err(|e| request_failed(&peer.node_id, e))?
            .json()
            .await
            .map_err(|e| invalid_response(&peer.node_id, e))?;
        normalize::parse_hash(&body.hash).map_err(|e| PeerNetError::InvalidResponse {
            peer: peer.node_id.clone(),
            reason: e.to_string(),
        })
    }
}

fn request_failed(peer: &str, e: impl std::fmt::Display) -> PeerNetError {
    PeerNetError::RequestFailed {
        peer: peer.to_string(),
        reason: e.to_string(),
    }
}

fn invalid_response(peer: &str, e: impl std::fmt::Display) -> PeerNetError {
    PeerNetError::InvalidResponse {
        peer: peer.to_string(),
        reason: e.to_string(),
    }
}
