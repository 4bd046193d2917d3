//! Proof generation and verification for distribution trees.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use stakedrop_core::hashing::{compute_leaf_hash, hash_sorted_pair};

/// Membership proof for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Recipient account.
    pub account: Address,

    /// Amount committed for the account.
    pub amount: U256,

    /// Sibling hashes from leaf to root.
    ///
    /// Levels where the node was promoted without a sibling contribute nothing,
    /// so the length may be shorter than the tree height.
    pub siblings: Vec<B256>,
}

impl MerkleProof {
    /// Construct a new proof.
    pub fn new(account: Address, amount: U256, siblings: Vec<B256>) -> Self {
        Self {
            account,
            amount,
            siblings,
        }
    }

    /// The leaf hash this proof starts from.
    pub fn leaf(&self) -> B256 {
        compute_leaf_hash(&self.account, self.amount)
    }

    /// Verify this proof against a root hash.
    pub fn verify(&self, root: B256) -> bool {
        verify_proof(&self.siblings, self.leaf(), root)
    }
}

/// Verify a sorted-pair proof the way the staking contract does.
///
/// Folds the siblings into the leaf with [`hash_sorted_pair`] and compares
/// the result to `root`.
pub fn verify_proof(siblings: &[B256], leaf: B256, root: B256) -> bool {
    compute_root(siblings, leaf) == root
}

/// Compute the root implied by a leaf and its siblings.
pub fn compute_root(siblings: &[B256], leaf: B256) -> B256 {
    siblings
        .iter()
        .fold(leaf, |hash, sibling| hash_sorted_pair(&hash, sibling))
}
