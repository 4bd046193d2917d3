//! Error types for the Merkle crate.

use alloy_primitives::Address;
use thiserror::Error;

/// Merkle error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    /// Tree is empty (no leaves).
    #[error("Tree is empty - cannot build a distribution without recipients")]
    EmptyTree,

    /// The same account was inserted twice in one build.
    #[error("Duplicate recipient: {0}")]
    DuplicateLeaf(Address),

    /// Account is not part of the tree.
    #[error("Account not found: {0}")]
    AccountNotFound(Address),
}

/// Result type alias for MerkleError.
pub type Result<T> = std::result::Result<T, MerkleError>;
