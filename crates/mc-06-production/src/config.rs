//! Production configuration.

/// Tunables for block assembly and acceptance.
#[derive(Debug, Clone)]
pub struct ProductionConfig {
    /// Maximum transactions per produced block.
    pub max_txs_per_block: usize,
    /// Gas budget per block.
    pub max_gas_per_block: u64,
    /// Accepted clock skew for incoming block timestamps, in seconds.
    pub acceptable_skew_secs: u64,
    /// Seconds between production attempts.
    pub slot_interval_secs: u64,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        Self {
            max_txs_per_block: 500,
            max_gas_per_block: 15_000_000,
            acceptable_skew_secs: 120,
            slot_interval_secs: 10,
        }
    }
}
