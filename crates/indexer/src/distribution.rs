//! Eligibility, reward distribution and epoch generation.
//!
//! A distribution splits a pool of reward tokens across eligible stakers in
//! proportion to their active stake. Amounts are rounded down, so the
//! distributed sum can be short of the pool by less than one unit per
//! recipient; that dust stays in the pool.

use alloy::primitives::{Address, U256};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

use crate::storage::{EpochRecipient, NewEpoch, StakerSnapshot, Storage};
use stakedrop_core::{
    canonical_address, micros_to_whole_usd, parse_token_amount, EpochKind,
    BASE_REQUIRED_REFERRALS, NO_REFERRALS_REQUIRED_USD, REDUCED_REFERRALS_USD,
    REDUCED_REQUIRED_REFERRALS, VIP_MIN_TOTAL_REFERRALS,
};
use stakedrop_merkle::{MerkleBuilder, MerkleError};

/// Errors raised while generating an epoch.
#[derive(Debug, Error)]
pub enum DistributionError {
    /// Nobody qualifies, or the qualifying stake sums to zero.
    #[error("No eligible recipients")]
    NoEligibleRecipients,

    /// The pool is not a positive integer.
    #[error("Invalid pool amount: {0}")]
    InvalidPool(String),

    /// The Merkle tree could not be built.
    #[error(transparent)]
    Merkle(#[from] MerkleError),

    /// A generated proof does not verify against the root.
    #[error("Proof for {0} does not verify against the epoch root")]
    ProofVerification(Address),

    /// Reading the snapshot or persisting the epoch failed.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Direct referrals a user needs for the standard pool.
///
/// The requirement depends on the user's total staked value, not on any
/// single lock or package.
pub fn required_referrals(total_staked_usd_micros: u64) -> u64 {
    let usd = micros_to_whole_usd(total_staked_usd_micros);
    if usd >= NO_REFERRALS_REQUIRED_USD {
        0
    } else if usd >= REDUCED_REFERRALS_USD {
        REDUCED_REQUIRED_REFERRALS
    } else {
        BASE_REQUIRED_REFERRALS
    }
}

/// Whether a staker qualifies for the standard pool.
pub fn is_standard_eligible(staker: &StakerSnapshot) -> bool {
    staker.active_stake_usd > 0
        && staker.referrals.direct >= required_referrals(staker.total_staked_usd)
}

/// Whether a staker qualifies for the VIP pool.
pub fn is_vip_eligible(staker: &StakerSnapshot) -> bool {
    staker.active_stake_usd > 0 && staker.referrals.total() >= VIP_MIN_TOTAL_REFERRALS
}

/// Stakers eligible for `kind`, in snapshot order.
pub fn select_eligible(kind: EpochKind, stakers: &[StakerSnapshot]) -> Vec<&StakerSnapshot> {
    let eligible: fn(&StakerSnapshot) -> bool = match kind {
        EpochKind::Standard => is_standard_eligible,
        EpochKind::Vip => is_vip_eligible,
    };
    stakers.iter().filter(|staker| eligible(staker)).collect()
}

/// Split `pool` proportionally to `weights`, rounding each share down.
///
/// `reward_i = floor(pool * weight_i / total_weight)`.
pub fn distribute(pool: U256, weights: &[u64]) -> Result<Vec<U256>, DistributionError> {
    if pool.is_zero() {
        return Err(DistributionError::InvalidPool(pool.to_string()));
    }

    let total = weights
        .iter()
        .fold(U256::ZERO, |acc, w| acc + U256::from(*w));
    if weights.is_empty() || total.is_zero() {
        return Err(DistributionError::NoEligibleRecipients);
    }

    weights
        .iter()
        .map(|weight| {
            let weight = U256::from(*weight);
            match pool.checked_mul(weight) {
                Some(product) => Ok(product / total),
                None => Ok(mul_div_wide(pool, weight, total)),
            }
        })
        .collect()
}

// floor(a * b / d) without overflow, given b <= d.
fn mul_div_wide(a: U256, b: U256, d: U256) -> U256 {
    let quotient = a / d;
    let remainder = a % d;
    quotient * b + remainder * b / d
}

/// Two-decimal percentage of `weight` within `total`.
pub fn share_percent(weight: u64, total: u128) -> String {
    if total == 0 {
        return "0.00".to_string();
    }
    format!("{:.2}", weight as f64 * 100.0 / total as f64)
}

/// Compute a complete epoch from a snapshot without touching the store.
///
/// Every proof is checked against the root before the epoch is returned.
pub fn build_epoch(
    kind: EpochKind,
    pool: U256,
    stakers: &[StakerSnapshot],
) -> Result<NewEpoch, DistributionError> {
    let eligible = select_eligible(kind, stakers);
    let weights: Vec<u64> = eligible.iter().map(|s| s.active_stake_usd).collect();
    let amounts = distribute(pool, &weights)?;
    let total_weight: u128 = weights.iter().map(|w| u128::from(*w)).sum();

    let mut builder = MerkleBuilder::new();
    let mut recipients = Vec::with_capacity(eligible.len());
    let mut distributed = U256::ZERO;

    for (staker, amount) in eligible.iter().zip(&amounts) {
        builder.insert(staker.address, *amount)?;
        distributed += *amount;

        let (required_referrals, package_id) = match kind {
            EpochKind::Standard => (
                Some(required_referrals(staker.total_staked_usd)),
                staker.top_package.map(|p| p.id()),
            ),
            EpochKind::Vip => (None, None),
        };

        recipients.push(EpochRecipient {
            address: canonical_address(&staker.address),
            amount: amount.to_string(),
            stake_usd_micros: staker.active_stake_usd,
            total_staked_usd_micros: staker.total_staked_usd,
            share_percent: share_percent(staker.active_stake_usd, total_weight),
            direct_referrals: staker.referrals.direct,
            indirect_referrals: staker.referrals.indirect,
            total_referrals: staker.referrals.total(),
            required_referrals,
            package_id,
        });
    }

    let tree = builder.build()?;
    let root = tree.root();

    let mut proofs = BTreeMap::new();
    for (staker, amount) in eligible.iter().zip(&amounts) {
        let proof = tree.prove(&staker.address)?;
        if proof.amount != *amount || !proof.verify(root) {
            return Err(DistributionError::ProofVerification(staker.address));
        }
        proofs.insert(canonical_address(&staker.address), proof.siblings);
    }

    Ok(NewEpoch {
        kind,
        merkle_root: root,
        total_amount: pool,
        distributed_amount: distributed,
        recipients,
        proofs,
    })
}

/// An epoch that has been persisted.
#[derive(Debug, Clone)]
pub struct GeneratedEpoch {
    /// Store-assigned id
    pub id: u64,
    /// Persisted content
    pub epoch: NewEpoch,
}

/// Snapshot the store, compute the epoch for `kind` and persist it.
///
/// `pool` is a decimal token amount in smallest units. Nothing is written
/// unless every step succeeds.
pub async fn generate_epoch(
    storage: &Storage,
    kind: EpochKind,
    pool: &str,
) -> Result<GeneratedEpoch, DistributionError> {
    let pool_amount = parse_token_amount(pool)
        .ok()
        .filter(|amount| !amount.is_zero())
        .ok_or_else(|| DistributionError::InvalidPool(pool.to_string()))?;

    let stakers = storage.get_stakers_with_active_stake().await?;
    let epoch = build_epoch(kind, pool_amount, &stakers)?;
    let id = storage.insert_epoch(&epoch).await?;

    info!(
        epoch_id = id,
        kind = %kind,
        root = %epoch.merkle_root,
        recipients = epoch.recipients.len(),
        pool = %epoch.total_amount,
        distributed = %epoch.distributed_amount,
        "Epoch generated"
    );

    Ok(GeneratedEpoch { id, epoch })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::setup_storage;
    use crate::storage::ReferralCounts;
    use stakedrop_core::{compute_leaf_hash, parse_address, Package, MICROS_PER_USD};
    use stakedrop_merkle::verify_proof;

    fn staker(n: u8, usd: u64, direct: u64, indirect: u64) -> StakerSnapshot {
        StakerSnapshot {
            address: Address::repeat_byte(n),
            active_stake_usd: usd * MICROS_PER_USD,
            total_staked_usd: usd * MICROS_PER_USD,
            active_stakes: 1,
            top_package: Some(Package::Bronze),
            referrals: ReferralCounts { direct, indirect },
        }
    }

    #[test]
    fn test_required_referrals_bands() {
        let usd = |v: u64| v * MICROS_PER_USD;
        assert_eq!(required_referrals(0), 10);
        assert_eq!(required_referrals(usd(99)), 10);
        assert_eq!(required_referrals(usd(99) + 999_999), 10);
        assert_eq!(required_referrals(usd(100)), 5);
        assert_eq!(required_referrals(usd(999)), 5);
        assert_eq!(required_referrals(usd(1000)), 0);
        assert_eq!(required_referrals(usd(250_000)), 0);
    }

    #[test]
    fn test_eligibility_is_monotonic_in_stake() {
        // Same referrals, more stake never loses eligibility
        let mut previous = false;
        for usd in [10, 50, 99, 100, 500, 999, 1000, 5000] {
            let eligible = is_standard_eligible(&staker(1, usd, 5, 0));
            assert!(eligible || !previous, "lost eligibility at {usd} USD");
            previous = eligible;
        }
        assert!(!is_standard_eligible(&staker(1, 99, 5, 0)));
        assert!(is_standard_eligible(&staker(1, 100, 5, 0)));
        assert!(is_standard_eligible(&staker(1, 1000, 0, 0)));
    }

    #[test]
    fn test_vip_eligibility() {
        assert!(is_vip_eligible(&staker(1, 10, 40, 60)));
        assert!(!is_vip_eligible(&staker(1, 10, 40, 59)));
        assert!(!is_vip_eligible(&staker(1, 0, 100, 100)));
    }

    #[test]
    fn test_distribute_proportional() {
        let amounts = distribute(U256::from(300u64), &[100, 200]).unwrap();
        assert_eq!(amounts, vec![U256::from(100u64), U256::from(200u64)]);
    }

    #[test]
    fn test_distribute_dust_bound() {
        let pool = U256::from(1_000_003u64);
        let weights = [3, 7, 11, 13, 17];
        let amounts = distribute(pool, &weights).unwrap();

        let sum = amounts.iter().fold(U256::ZERO, |acc, a| acc + *a);
        assert!(sum <= pool);
        assert!(pool - sum < U256::from(weights.len() as u64));
    }

    #[test]
    fn test_distribute_large_pool_does_not_overflow() {
        let pool = U256::MAX;
        let amounts = distribute(pool, &[u64::MAX, u64::MAX]).unwrap();
        let sum = amounts.iter().fold(U256::ZERO, |acc, a| acc + *a);
        assert!(pool - sum < U256::from(2u64));
    }

    #[test]
    fn test_distribute_errors() {
        assert!(matches!(
            distribute(U256::ZERO, &[1]),
            Err(DistributionError::InvalidPool(_))
        ));
        assert!(matches!(
            distribute(U256::from(1u64), &[]),
            Err(DistributionError::NoEligibleRecipients)
        ));
        assert!(matches!(
            distribute(U256::from(1u64), &[0, 0]),
            Err(DistributionError::NoEligibleRecipients)
        ));
    }

    #[test]
    fn test_build_epoch_scenario() {
        // Two qualifying stakers with 100 and 200 USD, one who lacks referrals
        let stakers = vec![
            staker(1, 100, 5, 0),
            staker(2, 200, 5, 0),
            staker(3, 150, 4, 0),
        ];

        let epoch = build_epoch(EpochKind::Standard, U256::from(300u64), &stakers).unwrap();

        assert_eq!(epoch.recipients.len(), 2);
        assert_eq!(epoch.recipients[0].amount, "100");
        assert_eq!(epoch.recipients[1].amount, "200");
        assert_eq!(epoch.recipients[0].share_percent, "33.33");
        assert_eq!(epoch.recipients[1].share_percent, "66.67");
        assert_eq!(epoch.recipients[0].required_referrals, Some(5));
        assert_eq!(epoch.recipients[0].package_id, Some(1));
        assert_eq!(epoch.distributed_amount, U256::from(300u64));

        for recipient in &epoch.recipients {
            let address = parse_address(&recipient.address).unwrap();
            let amount = parse_token_amount(&recipient.amount).unwrap();
            let siblings = &epoch.proofs[&recipient.address];
            assert!(verify_proof(
                siblings,
                compute_leaf_hash(&address, amount),
                epoch.merkle_root
            ));
        }
    }

    #[test]
    fn test_build_epoch_with_stakes_at_storage_cap() {
        // Three weights at the i64 micro-USD cap sum past u64::MAX
        let cap = i64::MAX as u64;
        let stakers: Vec<StakerSnapshot> = (1..=3)
            .map(|n| StakerSnapshot {
                active_stake_usd: cap,
                total_staked_usd: cap,
                ..staker(n, 0, 0, 0)
            })
            .collect();

        let epoch = build_epoch(EpochKind::Standard, U256::from(3_000u64), &stakers).unwrap();

        assert_eq!(epoch.recipients.len(), 3);
        for recipient in &epoch.recipients {
            assert_eq!(recipient.amount, "1000");
            assert_eq!(recipient.share_percent, "33.33");
        }
        assert_eq!(share_percent(cap, u128::from(cap) * 2), "50.00");
    }

    #[test]
    fn test_build_epoch_root_ignores_snapshot_order() {
        let stakers = vec![
            staker(1, 100, 5, 0),
            staker(2, 200, 5, 0),
            staker(3, 1200, 0, 0),
        ];
        let mut reversed = stakers.clone();
        reversed.reverse();

        let a = build_epoch(EpochKind::Standard, U256::from(999u64), &stakers).unwrap();
        let b = build_epoch(EpochKind::Standard, U256::from(999u64), &reversed).unwrap();
        assert_eq!(a.merkle_root, b.merkle_root);
    }

    #[test]
    fn test_build_vip_epoch() {
        let stakers = vec![staker(1, 100, 50, 50), staker(2, 5000, 200, 0), staker(3, 10, 1, 1)];

        let epoch = build_epoch(EpochKind::Vip, U256::from(1000u64), &stakers).unwrap();
        assert_eq!(epoch.recipients.len(), 2);
        assert_eq!(epoch.recipients[0].total_referrals, 100);
        assert_eq!(epoch.recipients[0].required_referrals, None);
        assert_eq!(epoch.recipients[0].package_id, None);

        let err = build_epoch(EpochKind::Vip, U256::from(1000u64), &stakers[2..]).unwrap_err();
        assert!(matches!(err, DistributionError::NoEligibleRecipients));
    }

    #[tokio::test]
    async fn test_generate_epoch_persists_nothing_on_failure() {
        let (storage, _temp_db) = setup_storage().await;

        let err = generate_epoch(&storage, EpochKind::Standard, "1000")
            .await
            .unwrap_err();
        assert!(matches!(err, DistributionError::NoEligibleRecipients));

        let err = generate_epoch(&storage, EpochKind::Standard, "0")
            .await
            .unwrap_err();
        assert!(matches!(err, DistributionError::InvalidPool(_)));

        let err = generate_epoch(&storage, EpochKind::Standard, "12abc")
            .await
            .unwrap_err();
        assert!(matches!(err, DistributionError::InvalidPool(_)));

        assert_eq!(storage.count_epochs().await.unwrap(), 0);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_generate_epoch_from_store() {
        use crate::storage::stake::tests::lock;

        let (storage, _temp_db) = setup_storage().await;
        let whale = Address::repeat_byte(0x77);
        storage
            .record_lock(&lock(whale, 1, 1500, Package::Silver))
            .await
            .unwrap();

        let generated = generate_epoch(&storage, EpochKind::Standard, "5000")
            .await
            .unwrap();

        let stored = storage
            .get_epoch(EpochKind::Standard, generated.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.merkle_root, generated.epoch.merkle_root);
        assert_eq!(stored.recipients.len(), 1);
        assert_eq!(stored.recipients[0].amount, "5000");
        assert_eq!(stored.recipients[0].package_id, Some(2));
        // A single leaf is its own root
        assert!(stored.proofs[&canonical_address(&whale)].is_empty());

        storage.close().await;
    }
}
