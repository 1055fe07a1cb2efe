//! # Header Chain & SPV Verification
//!
//! Light-mode sync pulls only headers. The header chain must be dense,
//! parent-linked, and strictly increasing in time. Individual
//! transactions are then proven against a header's merkle root.

use shared_types::{BlockHeader, Hash, MerkleProof};

use crate::errors::SyncError;

/// Verify an ordered header chain segment.
///
/// `anchor` is the trusted predecessor of the first header (`None` when
/// the segment starts at genesis).
pub fn verify_header_chain(
    anchor: Option<&BlockHeader>,
    headers: &[BlockHeader],
) -> Result<(), SyncError> {
    let mut previous = anchor;
    for header in headers {
        if let Some(prev) = previous {
            let linked = header.height == prev.height + 1
                && header.parent_hash == prev.hash
                && header.timestamp > prev.timestamp;
            if !linked {
                return Err(SyncError::HeaderChainBroken {
                    height: header.height,
                });
            }
        }
        previous = Some(header);
    }
    Ok(())
}

/// Verify an SPV inclusion proof for `tx_hash` against a header.
pub fn verify_spv_proof(header: &BlockHeader, tx_hash: &Hash, proof: &MerkleProof) -> bool {
    proof.verify(tx_hash, &header.merkle_root)
}
