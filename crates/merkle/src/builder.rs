//! Builder for constructing distribution Merkle trees.

use alloy_primitives::{Address, U256};
use std::collections::HashSet;

use crate::error::{MerkleError, Result};
use crate::MerkleTree;

/// Builder for constructing a distribution tree.
///
/// The builder collects `(account, amount)` pairs and then constructs the
/// complete tree when `build()` is called.
///
/// # Examples
///
/// ```
/// use stakedrop_merkle::MerkleBuilder;
/// use alloy_primitives::{Address, U256};
///
/// let mut builder = MerkleBuilder::new();
/// builder.insert(Address::from([0x01; 20]), U256::from(100u64)).unwrap();
/// builder.insert(Address::from([0x02; 20]), U256::from(200u64)).unwrap();
/// let tree = builder.build().unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct MerkleBuilder {
    recipients: Vec<(Address, U256)>,
    seen: HashSet<Address>,
}

impl MerkleBuilder {
    /// Create a new empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a recipient.
    ///
    /// # Errors
    ///
    /// Returns `MerkleError::DuplicateLeaf` if the account was already added.
    /// Proofs are keyed by account, so one account can hold only one leaf.
    pub fn insert(&mut self, account: Address, amount: U256) -> Result<&mut Self> {
        if !self.seen.insert(account) {
            return Err(MerkleError::DuplicateLeaf(account));
        }
        self.recipients.push((account, amount));
        Ok(self)
    }

    /// Get the number of recipients in the builder.
    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    /// Check if the builder is empty.
    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    /// Build the tree.
    ///
    /// # Errors
    ///
    /// Returns `MerkleError::EmptyTree` when no recipient was added.
    pub fn build(self) -> Result<MerkleTree> {
        if self.recipients.is_empty() {
            return Err(MerkleError::EmptyTree);
        }
        Ok(MerkleTree::from_recipients(self.recipients))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_account_rejected() {
        let mut builder = MerkleBuilder::new();
        let account = Address::from([0x01; 20]);
        builder.insert(account, U256::from(1u64)).unwrap();

        let err = builder.insert(account, U256::from(2u64)).unwrap_err();
        assert_eq!(err, MerkleError::DuplicateLeaf(account));
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_empty_build_fails() {
        assert_eq!(
            MerkleBuilder::new().build().unwrap_err(),
            MerkleError::EmptyTree
        );
    }
}
