//! Distribution tree - the main tree structure.

use alloy_primitives::{Address, B256, U256};
use stakedrop_core::hashing::{compute_leaf_hash, hash_sorted_pair};
use std::collections::HashMap;

use crate::error::{MerkleError, Result};
use crate::proof::MerkleProof;

/// An immutable sorted-pair Merkle tree over `(account, amount)` leaves.
///
/// Layer 0 holds the leaf hashes sorted ascending; each following layer hashes
/// adjacent pairs with [`hash_sorted_pair`]. A trailing node without a partner
/// is promoted to the next layer unchanged.
///
/// # Examples
///
/// ```
/// use stakedrop_merkle::MerkleBuilder;
/// use alloy_primitives::{Address, U256};
///
/// let account = Address::from([0x01; 20]);
/// let mut builder = MerkleBuilder::new();
/// builder.insert(account, U256::from(100u64)).unwrap();
/// builder.insert(Address::from([0x02; 20]), U256::from(200u64)).unwrap();
/// let tree = builder.build().unwrap();
///
/// let proof = tree.prove(&account).unwrap();
/// assert!(proof.verify(tree.root()));
/// ```
#[derive(Debug, Clone)]
pub struct MerkleTree {
    layers: Vec<Vec<B256>>,
    positions: HashMap<Address, (U256, usize)>,
}

impl MerkleTree {
    /// Build the tree from a non-empty, duplicate-free recipient list.
    ///
    /// This is internal - users should use `MerkleBuilder` instead.
    pub(crate) fn from_recipients(recipients: Vec<(Address, U256)>) -> Self {
        let mut leaves: Vec<(B256, Address, U256)> = recipients
            .into_iter()
            .map(|(account, amount)| (compute_leaf_hash(&account, amount), account, amount))
            .collect();
        leaves.sort_by(|a, b| a.0.cmp(&b.0));

        let positions = leaves
            .iter()
            .enumerate()
            .map(|(index, (_, account, amount))| (*account, (*amount, index)))
            .collect();

        let mut layers = vec![leaves.into_iter().map(|(hash, _, _)| hash).collect::<Vec<_>>()];
        while layers.last().map(Vec::len).unwrap_or(0) > 1 {
            let next = Self::next_layer(layers.last().map(Vec::as_slice).unwrap_or_default());
            layers.push(next);
        }

        Self { layers, positions }
    }

    fn next_layer(layer: &[B256]) -> Vec<B256> {
        layer
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => hash_sorted_pair(left, right),
                [single] => *single,
                _ => unreachable!("chunks(2) yields one or two items"),
            })
            .collect()
    }

    /// Get the root hash of the tree.
    pub fn root(&self) -> B256 {
        self.layers
            .last()
            .and_then(|layer| layer.first())
            .copied()
            .unwrap_or(B256::ZERO)
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Check if the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Number of layers including leaves and root.
    pub fn height(&self) -> usize {
        self.layers.len()
    }

    /// Leaf hashes in tree order (sorted ascending).
    pub fn leaves(&self) -> &[B256] {
        self.layers.first().map(Vec::as_slice).unwrap_or_default()
    }

    /// Leaf hash for an account, if present.
    pub fn leaf(&self, account: &Address) -> Option<B256> {
        self.positions
            .get(account)
            .map(|(amount, _)| compute_leaf_hash(account, *amount))
    }

    /// Generate a membership proof for an account.
    ///
    /// # Errors
    ///
    /// Returns `MerkleError::AccountNotFound` when the account has no leaf.
    pub fn prove(&self, account: &Address) -> Result<MerkleProof> {
        let (amount, mut index) = self
            .positions
            .get(account)
            .copied()
            .ok_or(MerkleError::AccountNotFound(*account))?;

        let mut siblings = Vec::with_capacity(self.layers.len().saturating_sub(1));
        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling = index ^ 1;
            if let Some(hash) = layer.get(sibling) {
                siblings.push(*hash);
            }
            index /= 2;
        }

        Ok(MerkleProof::new(*account, amount, siblings))
    }

    /// Generate proofs for every account, keyed by account.
    pub fn prove_all(&self) -> HashMap<Address, MerkleProof> {
        self.positions
            .keys()
            .filter_map(|account| self.prove(account).ok().map(|proof| (*account, proof)))
            .collect()
    }
}
