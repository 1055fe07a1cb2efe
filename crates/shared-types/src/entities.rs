//! # Core Domain Entities
//!
//! Defines the ledger entities shared across subsystems.
//!
//! ## Clusters
//!
//! - **Accounts**: [`Address`], [`WalletAccount`], [`ContractState`]
//! - **Consensus**: [`Validator`], [`StakeRecord`]
//! - **Networking**: [`NodeRecord`], [`NodeStatus`]
//! - **Sync**: [`Checkpoint`], [`StateSnapshot`]

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::ModelError;
use crate::normalize;
use crate::Hash;

/// A 20-byte account address, rendered as lowercase `0x`-prefixed hex.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The all-zero address, used for system-minted transfers.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Parse from hex, with or without the `0x` prefix.
    pub fn parse(input: &str) -> Result<Self, ModelError> {
        let canonical = normalize::normalize_address(input)?;
        let bytes = hex::decode(&canonical[2..])
            .map_err(|_| ModelError::MalformedAddress(input.to_string()))?;
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let s = String::deserialize(de)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Mutable account state tracked by the relational store.
///
/// The nonce equals the count of confirmed outgoing transactions and is
/// monotonically non-decreasing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAccount {
    pub address: Address,
    /// Compressed secp256k1 public key, when known.
    #[serde(default, with = "crate::hex0x::opt_bytes")]
    pub public_key: Option<Vec<u8>>,
    pub balance: u64,
    pub nonce: u64,
}

/// Validator lifecycle status. Only `Active` validators may produce blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidatorStatus {
    Active,
    Jailed,
    Inactive,
}

/// A staking validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    pub stake: u64,
    pub status: ValidatorStatus,
    /// Bounded reputation window; clamped to [-100, 100].
    pub reputation: i32,
}

impl Validator {
    pub fn is_active(&self) -> bool {
        self.status == ValidatorStatus::Active
    }
}

/// A staking ledger row backing a validator's stake total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeRecord {
    pub address: Address,
    pub amount: u64,
    pub since_height: u64,
}

/// Deployed contract state. Bytecode and address are immutable; storage is
/// written by the contract VM, an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractState {
    pub address: Address,
    #[serde(with = "crate::hex0x::bytes")]
    pub bytecode: Vec<u8>,
    pub storage: BTreeMap<String, String>,
    pub creator: Address,
    pub created_at_height: u64,
}

/// Health bucket for a known peer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Offline,
    Recovering,
}

/// A known peer node and its observed health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: String,
    pub url: String,
    pub last_seen: u64,
    pub reputation: i32,
    pub health_score: u8,
    pub status: NodeStatus,
}

impl NodeRecord {
    /// A freshly discovered peer, optimistically healthy.
    pub fn new(node_id: impl Into<String>, url: impl Into<String>, now: u64) -> Self {
        Self {
            node_id: node_id.into(),
            url: url.into(),
            last_seen: now,
            reputation: 0,
            health_score: 100,
            status: NodeStatus::Healthy,
        }
    }
}

/// A trusted checkpoint. Checkpoints come from configuration, never from
/// the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub height: u64,
    #[serde(with = "crate::hex0x::hash")]
    pub block_hash: Hash,
    #[serde(with = "crate::hex0x::hash")]
    pub state_root: Hash,
    pub timestamp: u64,
}

/// A serialized state image at a specific height, used by fast-sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub height: u64,
    #[serde(with = "crate::hex0x::hash")]
    pub state_root: Hash,
    pub accounts: Vec<WalletAccount>,
    pub validators: Vec<Validator>,
    pub contracts: Vec<ContractState>,
}

impl StateSnapshot {
    /// Recompute the state root over the canonical ordering of the image.
    ///
    /// Accounts, validators, and contracts are folded in address order so
    /// two snapshots of the same state always agree.
    pub fn compute_state_root(&self) -> Hash {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.height.to_be_bytes());
        let mut accounts = self.accounts.clone();
        accounts.sort_by_key(|a| a.address);
        for account in &accounts {
            hasher.update(account.address.as_bytes());
            hasher.update(account.balance.to_be_bytes());
            hasher.update(account.nonce.to_be_bytes());
        }
        let mut validators = self.validators.clone();
        validators.sort_by_key(|v| v.address);
        for validator in &validators {
            hasher.update(validator.address.as_bytes());
            hasher.update(validator.stake.to_be_bytes());
        }
        let mut contracts = self.contracts.clone();
        contracts.sort_by_key(|c| c.address);
        for contract in &contracts {
            hasher.update(contract.address.as_bytes());
            hasher.update(&contract.bytecode);
        }
        hasher.finalize().into()
    }
}
