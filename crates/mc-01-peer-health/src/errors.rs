//! Peer networking error types.

use thiserror::Error;

/// Errors from routing and outbound requests.
#[derive(Debug, Error)]
pub enum PeerNetError {
    /// No peer in the healthy or degraded buckets.
    #[error("no eligible peer available")]
    NoPeerAvailable,

    /// The circuit for this (peer, operation) is open.
    #[error("circuit open for {peer} / {operation}")]
    CircuitOpen { peer: String, operation: String },

    /// Outbound request failed.
    #[error("request to {peer} failed: {reason}")]
    RequestFailed { peer: String, reason: String },

    /// All failover attempts exhausted.
    #[error("operation {operation} failed after {attempts} attempts")]
    RetriesExhausted { operation: String, attempts: u32 },

    /// Peer returned a malformed body.
    #[error("peer {peer} returned an invalid response: {reason}")]
    InvalidResponse { peer: String, reason: String },
}
