//! Database types for the indexer storage layer.

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use stakedrop_core::{EpochKind, Package, StakeStatus};
use std::collections::BTreeMap;

/// A user as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Wallet address (stored in canonical lowercase form)
    pub address: Address,

    /// Derived display referral code
    pub referral_code: String,

    /// Who referred this user, if anyone
    pub referrer: Option<Address>,

    /// Users whose referrer is this user
    pub direct_referrals: u64,

    /// Descendants at depth 2 and 3
    pub indirect_referrals: u64,

    /// direct + indirect
    pub total_referrals: u64,

    /// Sum of active stakes in micro-USD
    pub total_staked_usd: u64,

    /// Unix timestamp of first observation
    pub created_at: i64,

    /// Unix timestamp of last mutation
    pub updated_at: i64,
}

/// Derived referral aggregates for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralCounts {
    /// Depth-1 descendants.
    pub direct: u64,
    /// Depth-2 and depth-3 descendants.
    pub indirect: u64,
}

impl ReferralCounts {
    /// direct + indirect.
    pub const fn total(&self) -> u64 {
        self.direct + self.indirect
    }
}

/// One on-chain lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeRecord {
    /// Owner of the lock
    pub user: Address,

    /// Lock id, unique per user
    pub lock_id: U256,

    /// USD value at lock time, micro-USD
    pub amount_usd: u64,

    /// Raw token amount locked
    pub token_amount: U256,

    /// Package selected for the lock
    pub package: Package,

    /// Lock start (unix seconds)
    pub start_time: u64,

    /// Lock end (unix seconds)
    pub end_time: u64,

    /// Lifecycle status
    pub status: StakeStatus,

    /// Transaction that emitted the Locked event
    pub tx_hash: B256,

    /// Block of the Locked event
    pub block_number: u64,

    /// Log index of the Locked event
    pub log_index: u64,
}

/// Outcome of applying a withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawOutcome {
    /// Stake moved from active to withdrawn; carries the released micro-USD.
    Withdrawn(u64),
    /// Stake was already withdrawn (replay).
    AlreadyWithdrawn,
    /// No stake row for `(user, lock_id)`.
    NotFound,
}

/// Outcome of recording a referrer edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferrerUpdate {
    /// The edge was written.
    Set,
    /// The user already has this referrer (replay).
    Unchanged,
    /// The user already has a different referrer, which is kept.
    Conflict(Address),
}

/// Per-user aggregate of active stakes joined with referral counts.
///
/// This is the snapshot the distribution calculator works from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakerSnapshot {
    /// Wallet address
    pub address: Address,

    /// Sum of active stake values, micro-USD
    pub active_stake_usd: u64,

    /// `users.total_staked_usd`, micro-USD
    pub total_staked_usd: u64,

    /// Number of active locks
    pub active_stakes: u64,

    /// Highest package among active locks
    pub top_package: Option<Package>,

    /// Referral aggregates
    pub referrals: ReferralCounts,
}

/// One recipient line of an epoch.
///
/// Carries enough metadata to replay the distribution from the same pool and snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochRecipient {
    /// Canonical lowercase address
    pub address: String,

    /// Reward in token smallest units (decimal string)
    pub amount: String,

    /// Weight used for the split, micro-USD
    pub stake_usd_micros: u64,

    /// User's total staked at snapshot time, micro-USD
    pub total_staked_usd_micros: u64,

    /// Share of the eligible weight in percent, two decimals
    pub share_percent: String,

    /// Direct referrals at snapshot time
    pub direct_referrals: u64,

    /// Indirect referrals at snapshot time
    pub indirect_referrals: u64,

    /// Total referrals at snapshot time
    pub total_referrals: u64,

    /// Direct referrals the user needed (standard epochs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_referrals: Option<u64>,

    /// Highest active package id (standard epochs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<u8>,
}

/// An epoch ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEpoch {
    /// Reward stream
    pub kind: EpochKind,

    /// Merkle root over all recipients
    pub merkle_root: B256,

    /// Pool size requested by the operator
    pub total_amount: U256,

    /// Sum of recipient amounts (pool minus dust)
    pub distributed_amount: U256,

    /// Recipients in calculation order
    pub recipients: Vec<EpochRecipient>,

    /// Canonical address -> sibling hashes leaf to root
    pub proofs: BTreeMap<String, Vec<B256>>,
}

/// An epoch record as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochRecord {
    /// Per-kind sequence number, starting at 1
    pub id: u64,

    /// Reward stream
    pub kind: EpochKind,

    /// Merkle root over all recipients
    pub merkle_root: B256,

    /// Pool size requested by the operator
    pub total_amount: U256,

    /// Sum of recipient amounts
    pub distributed_amount: U256,

    /// Recipients in calculation order
    pub recipients: Vec<EpochRecipient>,

    /// Canonical address -> sibling hashes
    pub proofs: BTreeMap<String, Vec<B256>>,

    /// Epoch id given to the contract at publication, once published
    pub blockchain_epoch_id: Option<u64>,

    /// Unix timestamp of creation
    pub created_at: i64,
}

impl EpochRecord {
    /// Epoch id the contract knows this epoch by.
    ///
    /// The contract numbers each kind separately, like the store does. An id
    /// recorded at publication wins over the store's sequence number.
    pub fn onchain_epoch_id(&self) -> u64 {
        self.blockchain_epoch_id.unwrap_or(self.id)
    }

    /// Find a recipient line by canonical address.
    pub fn recipient(&self, canonical_address: &str) -> Option<&EpochRecipient> {
        self.recipients
            .iter()
            .find(|r| r.address == canonical_address)
    }
}

/// Epoch metadata without recipients and proofs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochSummary {
    /// Per-kind sequence number
    pub id: u64,
    /// Reward stream
    pub kind: EpochKind,
    /// Merkle root, 0x-hex
    pub merkle_root: B256,
    /// Pool size (decimal string)
    pub total_amount: String,
    /// Distributed sum (decimal string)
    pub distributed_amount: String,
    /// Number of recipients
    pub recipient_count: u64,
    /// On-chain id once published
    pub blockchain_epoch_id: Option<u64>,
    /// Unix timestamp of creation
    pub created_at: i64,
}

/// Local record of an observed claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardClaimRecord {
    /// Claimant
    pub user: Address,
    /// On-chain epoch id as emitted by the contract
    pub epoch_id: u64,
    /// Reward stream
    pub kind: EpochKind,
    /// Claimed amount
    pub amount: U256,
    /// Claim transaction
    pub tx_hash: Option<B256>,
    /// Claim block
    pub block_number: Option<u64>,
}

/// Sync state record (singleton).
///
/// Tracks the indexer's progress through the blockchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    /// First block not yet processed
    pub next_block: u64,

    /// Chain ID (for safety)
    pub chain_id: u64,

    /// Whether the cursor has been seeded
    pub initialized: bool,

    /// Unix timestamp of last update
    pub updated_at: i64,
}

/// Block coordinates for ordering events.
///
/// Events fetched by separate per-type queries are merged and applied in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockCoordinates {
    /// Block number
    pub block_number: u64,

    /// Log index within the block
    pub log_index: u64,
}

impl BlockCoordinates {
    /// Create new block coordinates.
    pub fn new(block_number: u64, log_index: u64) -> Self {
        Self {
            block_number,
            log_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_coordinates_ordering() {
        let coord1 = BlockCoordinates::new(100, 2);
        let coord2 = BlockCoordinates::new(100, 3);
        let coord3 = BlockCoordinates::new(101, 0);

        assert!(coord1 < coord2);
        assert!(coord2 < coord3);
    }

    #[test]
    fn test_onchain_epoch_id_prefers_published_id() {
        let mut epoch = EpochRecord {
            id: 7,
            kind: EpochKind::Standard,
            merkle_root: B256::ZERO,
            total_amount: U256::from(1u64),
            distributed_amount: U256::from(1u64),
            recipients: vec![],
            proofs: BTreeMap::new(),
            blockchain_epoch_id: None,
            created_at: 0,
        };
        assert_eq!(epoch.onchain_epoch_id(), 7);

        epoch.blockchain_epoch_id = Some(2);
        assert_eq!(epoch.onchain_epoch_id(), 2);
    }

    #[test]
    fn test_recipient_serializes_camel_case() {
        let recipient = EpochRecipient {
            address: "0x01".to_string(),
            amount: "100".to_string(),
            stake_usd_micros: 100_000_000,
            total_staked_usd_micros: 100_000_000,
            share_percent: "33.33".to_string(),
            direct_referrals: 5,
            indirect_referrals: 0,
            total_referrals: 5,
            required_referrals: Some(5),
            package_id: None,
        };
        let json = serde_json::to_value(&recipient).unwrap();
        assert_eq!(json["sharePercent"], "33.33");
        assert_eq!(json["requiredReferrals"], 5);
        assert!(json.get("packageId").is_none());
    }
}
