//! # Bus Events
//!
//! The typed event set carried by the bus and, via the envelope codec,
//! across the wire. Each variant maps to exactly one wire `type` string.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use shared_types::{Block, Hash, NodeStatus, Transaction};

/// Coarse event grouping used by subscription filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Block lifecycle.
    Chain,
    /// Mempool admission and removal.
    Mempool,
    /// Gap and fork handling.
    Sync,
    /// Peer liveness and status.
    Network,
}

/// An event on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChainEvent {
    /// A block was appended to the canonical chain.
    BlockAdded {
        block_hash: Hash,
        block_height: u64,
        /// Full payload, included for immediate neighbors.
        block: Option<Block>,
    },
    /// A transaction should be relayed to peers.
    TransactionPropagate {
        tx_hash: Hash,
        transaction: Option<Transaction>,
    },
    /// A peer disagrees with our hash at a height.
    ForkDetected {
        fork_height: u64,
        remote_hash: Hash,
        local_hash: Option<Hash>,
    },
    /// An announced height is ahead of the local tip.
    SyncGapDetected {
        local_height: u64,
        received_height: u64,
        gap_size: u64,
    },
    /// Periodic liveness beacon.
    Heartbeat {
        block_height: u64,
        mempool_size: usize,
        timestamp: u64,
        node_id: String,
    },
    /// A transaction entered the mempool.
    MempoolTransactionAdded {
        transaction_hash: Hash,
        mempool_size: usize,
    },
    /// A transaction left the mempool.
    MempoolTransactionRemoved {
        transaction_hash: Hash,
        mempool_size: usize,
    },
    /// A node reported a status transition.
    NodeStatusChanged { node_id: String, status: NodeStatus },
}

impl ChainEvent {
    /// The wire `type` string for this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::BlockAdded { .. } => "block.added",
            Self::TransactionPropagate { .. } => "transaction.propagate",
            Self::ForkDetected { .. } => "fork.detected",
            Self::SyncGapDetected { .. } => "sync.gap_detected",
            Self::Heartbeat { .. } => "heartbeat",
            Self::MempoolTransactionAdded { .. } => "mempool.transaction.added",
            Self::MempoolTransactionRemoved { .. } => "mempool.transaction.removed",
            Self::NodeStatusChanged { .. } => "node.status_update",
        }
    }

    /// The topic this event belongs to.
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::BlockAdded { .. } => EventTopic::Chain,
            Self::TransactionPropagate { .. }
            | Self::MempoolTransactionAdded { .. }
            | Self::MempoolTransactionRemoved { .. } => EventTopic::Mempool,
            Self::ForkDetected { .. } | Self::SyncGapDetected { .. } => EventTopic::Sync,
            Self::Heartbeat { .. } | Self::NodeStatusChanged { .. } => EventTopic::Network,
        }
    }

    /// The wire `data` payload for this event.
    pub fn data_json(&self) -> Value {
        match self {
            Self::BlockAdded {
                block_hash,
                block_height,
                block,
            } => {
                let mut data = json!({
                    "block_hash": hex0x(block_hash),
                    "block_height": block_height,
                });
                if let Some(block) = block {
                    data["block"] = serde_json::to_value(block).unwrap_or(Value::Null);
                }
                data
            }
            Self::TransactionPropagate { tx_hash, transaction } => {
                let mut data = json!({ "tx_hash": hex0x(tx_hash) });
                if let Some(tx) = transaction {
                    data["transaction"] = serde_json::to_value(tx).unwrap_or(Value::Null);
                }
                data
            }
            Self::ForkDetected {
                fork_height,
                remote_hash,
                local_hash,
            } => {
                let mut data = json!({
                    "fork_height": fork_height,
                    "remote_hash": hex0x(remote_hash),
                });
                if let Some(local) = local_hash {
                    data["local_hash"] = Value::String(hex0x(local));
                }
                data
            }
            Self::SyncGapDetected {
                local_height,
                received_height,
                gap_size,
            } => json!({
                "local_height": local_height,
                "received_height": received_height,
                "gap_size": gap_size,
            }),
            Self::Heartbeat {
                block_height,
                mempool_size,
                timestamp,
                node_id,
            } => json!({
                "block_height": block_height,
                "mempool_size": mempool_size,
                "timestamp": timestamp,
                "node_id": node_id,
            }),
            Self::MempoolTransactionAdded {
                transaction_hash,
                mempool_size,
            }
            | Self::MempoolTransactionRemoved {
                transaction_hash,
                mempool_size,
            } => json!({
                "transaction_hash": hex0x(transaction_hash),
                "mempool_size": mempool_size,
            }),
            Self::NodeStatusChanged { node_id, status } => json!({
                "node_id": node_id,
                "status": status,
            }),
        }
    }

    /// Rebuild an event from its wire `type` and `data`.
    ///
    /// Returns `None` for unknown types or missing required fields.
    pub fn from_wire(event_type: &str, data: &Value) -> Option<Self> {
        match event_type {
            "block.added" => Some(Self::BlockAdded {
                block_hash: parse_hash_field(data, "block_hash")?,
                block_height: data.get("block_height")?.as_u64()?,
                block: data
                    .get("block")
                    .and_then(|b| serde_json::from_value(b.clone()).ok()),
            }),
            "transaction.propagate" => Some(Self::TransactionPropagate {
                tx_hash: parse_hash_field(data, "tx_hash")?,
                transaction: data
                    .get("transaction")
                    .and_then(|t| serde_json::from_value(t.clone()).ok()),
            }),
            "fork.detected" => Some(Self::ForkDetected {
                fork_height: data.get("fork_height")?.as_u64()?,
                remote_hash: parse_hash_field(data, "remote_hash")?,
                local_hash: parse_hash_field(data, "local_hash"),
            }),
            "sync.gap_detected" => Some(Self::SyncGapDetected {
                local_height: data.get("local_height")?.as_u64()?,
                received_height: data.get("received_height")?.as_u64()?,
                gap_size: data.get("gap_size")?.as_u64()?,
            }),
            "heartbeat" => Some(Self::Heartbeat {
                block_height: data.get("block_height")?.as_u64()?,
                mempool_size: data.get("mempool_size")?.as_u64()? as usize,
                timestamp: data.get("timestamp")?.as_u64()?,
                node_id: data.get("node_id")?.as_str()?.to_string(),
            }),
            "mempool.transaction.added" => Some(Self::MempoolTransactionAdded {
                transaction_hash: parse_hash_field(data, "transaction_hash")?,
                mempool_size: data.get("mempool_size")?.as_u64()? as usize,
            }),
            "mempool.transaction.removed" => Some(Self::MempoolTransactionRemoved {
                transaction_hash: parse_hash_field(data, "transaction_hash")?,
                mempool_size: data.get("mempool_size")?.as_u64()? as usize,
            }),
            "node.status_update" => Some(Self::NodeStatusChanged {
                node_id: data.get("node_id")?.as_str()?.to_string(),
                status: serde_json::from_value(data.get("status")?.clone()).ok()?,
            }),
            _ => None,
        }
    }
}

fn hex0x(hash: &Hash) -> String {
    format!("0x{}", hex::encode(hash))
}

fn parse_hash_field(data: &Value, field: &str) -> Option<Hash> {
    let s = data.get(field)?.as_str()?;
    shared_types::normalize::parse_hash(s).ok()
}

/// Filter for stream subscriptions.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to receive; empty means all.
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    /// Receive everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Receive only the listed topics.
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    /// Whether `event` passes this filter.
    pub fn matches(&self, event: &ChainEvent) -> bool {
        self.topics.is_empty() || self.topics.contains(&event.topic())
    }
}
