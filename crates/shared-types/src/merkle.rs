//! # Merkle Commitment
//!
//! Pairwise SHA-256 tree over the ordered transaction hashes of a block.
//! An odd trailing hash is paired with itself. The empty list commits to
//! the zero digest.

use sha2::{Digest, Sha256};

use crate::{Hash, ZERO_HASH};

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Compute the merkle root over ordered leaf hashes.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return ZERO_HASH;
    }
    let mut level: Vec<Hash> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let right = pair.get(1).unwrap_or(&pair[0]);
            next.push(hash_pair(&pair[0], right));
        }
        level = next;
    }
    level[0]
}

/// Inclusion proof for a single leaf, used by SPV verification.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MerkleProof {
    /// Position of the leaf in the ordered list.
    pub leaf_index: usize,
    /// Sibling hashes from the leaf level up to the root.
    pub siblings: Vec<Hash>,
}

impl MerkleProof {
    /// Build the proof for `leaf_index` over `leaves`.
    pub fn build(leaves: &[Hash], leaf_index: usize) -> Option<Self> {
        if leaf_index >= leaves.len() {
            return None;
        }
        let mut siblings = Vec::new();
        let mut level: Vec<Hash> = leaves.to_vec();
        let mut index = leaf_index;
        while level.len() > 1 {
            let sibling_index = if index % 2 == 0 { index + 1 } else { index - 1 };
            let sibling = level.get(sibling_index).copied().unwrap_or(level[index]);
            siblings.push(sibling);

            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            for pair in level.chunks(2) {
                let right = pair.get(1).unwrap_or(&pair[0]);
                next.push(hash_pair(&pair[0], right));
            }
            level = next;
            index /= 2;
        }
        Some(Self { leaf_index, siblings })
    }

    /// Verify that `leaf` is committed under `root`.
    pub fn verify(&self, leaf: &Hash, root: &Hash) -> bool {
        let mut current = *leaf;
        let mut index = self.leaf_index;
        for sibling in &self.siblings {
            current = if index % 2 == 0 {
                hash_pair(&current, sibling)
            } else {
                hash_pair(sibling, &current)
            };
            index /= 2;
        }
        current == *root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: u8) -> Vec<Hash> {
        (0..n).map(|i| [i; 32]).collect()
    }

    #[test]
    fn test_empty_root_is_zero() {
        assert_eq!(merkle_root(&[]), ZERO_HASH);
    }

    #[test]
    fn test_single_leaf_is_its_own_root() {
        let l = leaves(1);
        assert_eq!(merkle_root(&l), l[0]);
    }

    #[test]
    fn test_odd_leaf_is_duplicated() {
        let l = leaves(3);
        let left = hash_pair(&l[0], &l[1]);
        let right = hash_pair(&l[2], &l[2]);
        assert_eq!(merkle_root(&l), hash_pair(&left, &right));
    }

    #[test]
    fn test_root_changes_with_any_leaf() {
        let l = leaves(4);
        let mut altered = l.clone();
        altered[2] = [0xFF; 32];
        assert_ne!(merkle_root(&l), merkle_root(&altered));
    }

    #[test]
    fn test_proof_verifies_for_every_leaf() {
        for n in 1..9u8 {
            let l = leaves(n);
            let root = merkle_root(&l);
            for (i, leaf) in l.iter().enumerate() {
                let proof = MerkleProof::build(&l, i).unwrap();
                assert!(proof.verify(leaf, &root), "n={n} i={i}");
            }
        }
    }

    #[test]
    fn test_proof_rejects_wrong_leaf() {
        let l = leaves(5);
        let root = merkle_root(&l);
        let proof = MerkleProof::build(&l, 2).unwrap();
        assert!(!proof.verify(&[0xEE; 32], &root));
    }

    #[test]
    fn test_proof_out_of_range() {
        assert!(MerkleProof::build(&leaves(2), 5).is_none());
    }
}
