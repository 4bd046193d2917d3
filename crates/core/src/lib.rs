//! # Stakedrop Core
//!
//! Core types, constants and hashing utilities shared by the Stakedrop indexer,
//! Merkle builder and API.
//!
//! Everything that has to agree byte-for-byte with the staking contract lives
//! here: the packed leaf encoding, the sorted-pair node hash and the canonical
//! address form used as a database key.
//!
//! ## Features
//!
//! - **Ethereum Types**: Alloy primitives for Address, B256, U256 and keccak256
//! - **Domain Types**: EpochKind, StakeStatus, Package, canonical addresses
//! - **Constants**: eligibility thresholds and referral depth
//! - **Hashing**: `abi.encodePacked(address, uint256)` leaves and sorted pair hashing

#![warn(missing_docs)]

pub mod constants;
pub mod error;
pub mod hashing;
pub mod types;

// Re-export commonly used items
pub use constants::*;
pub use error::{CoreError, Result};
pub use hashing::{compute_leaf_hash, hash_sorted_pair, keccak256};
pub use types::*;

// Re-export Alloy primitives for convenience
pub use alloy_primitives::{Address, B256, U256};
