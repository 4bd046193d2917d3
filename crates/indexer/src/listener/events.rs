//! Event type definitions for the staking contract.

use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::SolEvent;
use anyhow::{Context, Result};
use stakedrop_core::EpochKind;

use crate::storage::BlockCoordinates;

// Events emitted by the staking contract. USD values carry 6 decimals.
sol! {
    #[derive(Debug, PartialEq, Eq)]
    event Locked(
        address indexed user,
        uint256 indexed lockId,
        uint256 amount,
        uint256 usdValue,
        uint8 packageId,
        uint256 startTime,
        uint256 endTime
    );

    #[derive(Debug, PartialEq, Eq)]
    event ReferrerSet(address indexed user, address indexed referrer);

    #[derive(Debug, PartialEq, Eq)]
    event Withdrawn(address indexed user, uint256 indexed lockId, uint256 amount);

    #[derive(Debug, PartialEq, Eq)]
    event RewardClaimed(address indexed user, uint256 indexed epochId, uint256 amount);

    #[derive(Debug, PartialEq, Eq)]
    event VipRewardClaimed(address indexed user, uint256 indexed epochId, uint256 amount);

    #[derive(Debug, PartialEq, Eq)]
    event RewardTokensFunded(address indexed funder, uint256 amount);

    #[derive(Debug, PartialEq, Eq)]
    event VipRewardTokensFunded(address indexed funder, uint256 amount);
}

/// Decoded payload of a watched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StakingEvent {
    /// Tokens were locked into a package.
    #[allow(missing_docs)]
    Locked {
        user: Address,
        lock_id: U256,
        token_amount: U256,
        /// USD value with 6 decimals
        usd_value: U256,
        package_id: u8,
        start_time: U256,
        end_time: U256,
    },

    /// A referral edge was recorded on-chain.
    #[allow(missing_docs)]
    ReferrerSet { user: Address, referrer: Address },

    /// A lock was withdrawn.
    #[allow(missing_docs)]
    Withdrawn {
        user: Address,
        lock_id: U256,
        token_amount: U256,
    },

    /// A reward was claimed from a standard or VIP epoch.
    #[allow(missing_docs)]
    RewardClaimed {
        kind: EpochKind,
        user: Address,
        /// Epoch id as known to the contract
        epoch_id: U256,
        amount: U256,
    },

    /// A reward pool was topped up.
    #[allow(missing_docs)]
    TokensFunded {
        kind: EpochKind,
        funder: Address,
        amount: U256,
    },
}

impl StakingEvent {
    /// Short label used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            StakingEvent::Locked { .. } => "Locked",
            StakingEvent::ReferrerSet { .. } => "ReferrerSet",
            StakingEvent::Withdrawn { .. } => "Withdrawn",
            StakingEvent::RewardClaimed {
                kind: EpochKind::Standard,
                ..
            } => "RewardClaimed",
            StakingEvent::RewardClaimed {
                kind: EpochKind::Vip,
                ..
            } => "VipRewardClaimed",
            StakingEvent::TokensFunded {
                kind: EpochKind::Standard,
                ..
            } => "RewardTokensFunded",
            StakingEvent::TokensFunded {
                kind: EpochKind::Vip,
                ..
            } => "VipRewardTokensFunded",
        }
    }
}

/// Signatures of every watched event, in a fixed order.
pub const WATCHED_EVENTS: [B256; 7] = [
    Locked::SIGNATURE_HASH,
    ReferrerSet::SIGNATURE_HASH,
    Withdrawn::SIGNATURE_HASH,
    RewardClaimed::SIGNATURE_HASH,
    VipRewardClaimed::SIGNATURE_HASH,
    RewardTokensFunded::SIGNATURE_HASH,
    VipRewardTokensFunded::SIGNATURE_HASH,
];

/// A watched event with its block coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
    /// Position in the chain, used for ordering
    pub coordinates: BlockCoordinates,

    /// Transaction hash
    pub tx_hash: B256,

    /// Decoded payload
    pub event: StakingEvent,
}

impl ChainEvent {
    /// Parse a watched event from an Alloy log.
    ///
    /// The first topic selects the decoder; unknown signatures are an error.
    pub fn from_log(log: &Log) -> Result<Self> {
        let block_number = log.block_number.context("Log missing block_number")?;
        let log_index = log.log_index.context("Log missing log_index")?;
        let tx_hash = log
            .transaction_hash
            .context("Log missing transaction_hash")?;
        let signature = log
            .topics()
            .first()
            .copied()
            .context("Log missing signature topic")?;

        let event = match signature {
            s if s == Locked::SIGNATURE_HASH => {
                let data = Locked::decode_log(log.as_ref(), true)
                    .context("Failed to decode Locked event")?;
                StakingEvent::Locked {
                    user: data.user,
                    lock_id: data.lockId,
                    token_amount: data.amount,
                    usd_value: data.usdValue,
                    package_id: data.packageId,
                    start_time: data.startTime,
                    end_time: data.endTime,
                }
            }
            s if s == ReferrerSet::SIGNATURE_HASH => {
                let data = ReferrerSet::decode_log(log.as_ref(), true)
                    .context("Failed to decode ReferrerSet event")?;
                StakingEvent::ReferrerSet {
                    user: data.user,
                    referrer: data.referrer,
                }
            }
            s if s == Withdrawn::SIGNATURE_HASH => {
                let data = Withdrawn::decode_log(log.as_ref(), true)
                    .context("Failed to decode Withdrawn event")?;
                StakingEvent::Withdrawn {
                    user: data.user,
                    lock_id: data.lockId,
                    token_amount: data.amount,
                }
            }
            s if s == RewardClaimed::SIGNATURE_HASH => {
                let data = RewardClaimed::decode_log(log.as_ref(), true)
                    .context("Failed to decode RewardClaimed event")?;
                StakingEvent::RewardClaimed {
                    kind: EpochKind::Standard,
                    user: data.user,
                    epoch_id: data.epochId,
                    amount: data.amount,
                }
            }
            s if s == VipRewardClaimed::SIGNATURE_HASH => {
                let data = VipRewardClaimed::decode_log(log.as_ref(), true)
                    .context("Failed to decode VipRewardClaimed event")?;
                StakingEvent::RewardClaimed {
                    kind: EpochKind::Vip,
                    user: data.user,
                    epoch_id: data.epochId,
                    amount: data.amount,
                }
            }
            s if s == RewardTokensFunded::SIGNATURE_HASH => {
                let data = RewardTokensFunded::decode_log(log.as_ref(), true)
                    .context("Failed to decode RewardTokensFunded event")?;
                StakingEvent::TokensFunded {
                    kind: EpochKind::Standard,
                    funder: data.funder,
                    amount: data.amount,
                }
            }
            s if s == VipRewardTokensFunded::SIGNATURE_HASH => {
                let data = VipRewardTokensFunded::decode_log(log.as_ref(), true)
                    .context("Failed to decode VipRewardTokensFunded event")?;
                StakingEvent::TokensFunded {
                    kind: EpochKind::Vip,
                    funder: data.funder,
                    amount: data.amount,
                }
            }
            other => anyhow::bail!("Unknown event signature {}", other),
        };

        Ok(Self {
            coordinates: BlockCoordinates::new(block_number, log_index),
            tx_hash,
            event,
        })
    }
}

/// Sort events into chain order.
pub fn sort_chain_order(events: &mut [ChainEvent]) {
    events.sort_by_key(|event| event.coordinates);
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Log as PrimitiveLog, LogData};

    fn rpc_log<E: SolEvent>(event: &E, block_number: u64, log_index: u64) -> Log {
        Log {
            inner: PrimitiveLog {
                address: Address::repeat_byte(0xcc),
                data: event.encode_log_data(),
            },
            block_hash: Some(B256::repeat_byte(0xbb)),
            block_number: Some(block_number),
            block_timestamp: None,
            transaction_hash: Some(B256::repeat_byte(0xaa)),
            transaction_index: Some(0),
            log_index: Some(log_index),
            removed: false,
        }
    }

    #[test]
    fn test_parse_locked() {
        let event = Locked {
            user: Address::repeat_byte(1),
            lockId: U256::from(7u64),
            amount: U256::from(1000u64),
            usdValue: U256::from(150_000_000u64),
            packageId: 1,
            startTime: U256::from(100u64),
            endTime: U256::from(200u64),
        };

        let parsed = ChainEvent::from_log(&rpc_log(&event, 10, 3)).unwrap();
        assert_eq!(parsed.coordinates, BlockCoordinates::new(10, 3));
        assert_eq!(parsed.tx_hash, B256::repeat_byte(0xaa));
        assert_eq!(
            parsed.event,
            StakingEvent::Locked {
                user: Address::repeat_byte(1),
                lock_id: U256::from(7u64),
                token_amount: U256::from(1000u64),
                usd_value: U256::from(150_000_000u64),
                package_id: 1,
                start_time: U256::from(100u64),
                end_time: U256::from(200u64),
            }
        );
    }

    #[test]
    fn test_parse_vip_claim_sets_kind() {
        let event = VipRewardClaimed {
            user: Address::repeat_byte(2),
            epochId: U256::from(4u64),
            amount: U256::from(55u64),
        };

        let parsed = ChainEvent::from_log(&rpc_log(&event, 1, 0)).unwrap();
        assert_eq!(parsed.event.name(), "VipRewardClaimed");
        assert!(matches!(
            parsed.event,
            StakingEvent::RewardClaimed {
                kind: EpochKind::Vip,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_signature_is_rejected() {
        let log = Log {
            inner: PrimitiveLog {
                address: Address::ZERO,
                data: LogData::new_unchecked(vec![B256::repeat_byte(9)], Default::default()),
            },
            block_number: Some(1),
            log_index: Some(0),
            transaction_hash: Some(B256::ZERO),
            ..Default::default()
        };
        assert!(ChainEvent::from_log(&log).is_err());
    }

    #[test]
    fn test_sort_chain_order() {
        let make = |block, index| ChainEvent {
            coordinates: BlockCoordinates::new(block, index),
            tx_hash: B256::ZERO,
            event: StakingEvent::ReferrerSet {
                user: Address::repeat_byte(1),
                referrer: Address::repeat_byte(2),
            },
        };
        let mut events = vec![make(5, 1), make(3, 9), make(5, 0)];
        sort_chain_order(&mut events);

        let order: Vec<_> = events
            .iter()
            .map(|e| (e.coordinates.block_number, e.coordinates.log_index))
            .collect();
        assert_eq!(order, vec![(3, 9), (5, 0), (5, 1)]);
    }
}
