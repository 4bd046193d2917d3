//! Hashing utilities for Stakedrop.
//!
//! Provides keccak256 hashing, the distribution leaf hash and the sorted pair
//! hash. All of these must match the staking contract exactly: a mismatch here
//! means every claim proof is rejected on-chain.

use alloy_primitives::{keccak256 as alloy_keccak256, Address, B256, U256};

/// Compute keccak256 hash of input data.
///
/// This is a re-export of Alloy's keccak256 for convenience.
///
/// # Example
///
/// ```
/// use stakedrop_core::hashing::keccak256;
///
/// let hash = keccak256(b"hello");
/// ```
pub fn keccak256(data: &[u8]) -> B256 {
    alloy_keccak256(data)
}

/// Compute the Merkle leaf for one recipient.
///
/// The leaf is `keccak256(abi.encodePacked(address account, uint256 amount))`:
/// - `account`: 20 bytes
/// - `amount`: 32 bytes, big-endian
/// - **Total**: 52 bytes
///
/// # Example
///
/// ```
/// use stakedrop_core::hashing::compute_leaf_hash;
/// use alloy_primitives::{Address, U256};
///
/// let leaf = compute_leaf_hash(&Address::from([0x11; 20]), U256::from(100u64));
/// // Same as Solidity: keccak256(abi.encodePacked(account, amount))
/// ```
pub fn compute_leaf_hash(account: &Address, amount: U256) -> B256 {
    let mut data = Vec::with_capacity(52);
    data.extend_from_slice(account.as_slice());
    data.extend_from_slice(&amount.to_be_bytes::<32>());

    keccak256(&data)
}

/// Hash two sibling nodes in sorted order.
///
/// The internal hash is `keccak256(min(a, b) || max(a, b))`, comparing the
/// hashes as big-endian byte strings. This is the commutative hash used by
/// OpenZeppelin's `MerkleProof.verify`, so proofs carry no left/right flags.
pub fn hash_sorted_pair(a: &B256, b: &B256) -> B256 {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };

    let mut data = [0u8; 64];
    data[..32].copy_from_slice(first.as_slice());
    data[32..].copy_from_slice(second.as_slice());

    keccak256(&data)
}
