//! Merkle distribution tree for Stakedrop.
//!
//! This crate provides:
//! - A builder collecting `(account, amount)` recipients
//! - A sorted-pair keccak tree with deterministic root
//! - Proof generation and verification matching OpenZeppelin `MerkleProof.verify`
//!
//! Building is a pure function of the recipient set. Leaves are sorted before
//! the tree is assembled, so the root does not depend on insertion order.

#![warn(missing_docs)]

pub mod builder;
pub mod error;
pub mod proof;
pub mod tree;

pub use builder::MerkleBuilder;
pub use error::{MerkleError, Result};
pub use proof::{verify_proof, MerkleProof};
pub use tree::MerkleTree;
