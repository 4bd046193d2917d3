//! Epoch and claim resolution.
//!
//! Resolves the proof a user needs to claim from an epoch and whether the
//! reward was already claimed. The contract is the source of truth for claim
//! status; the locally indexed claims are only consulted when the chain cannot
//! be read, and such answers are marked advisory.

use alloy::primitives::{Address, B256, U256};
use alloy::providers::{ProviderBuilder, RootProvider};
use alloy::sol;
use alloy::transports::http::{Client, Http};
use anyhow::{anyhow, Context};
use serde::Serialize;
use stakedrop_core::{canonical_address, EpochKind};
use stakedrop_indexer::listener::{with_retries, RetryPolicy};
use stakedrop_indexer::storage::{EpochRecord, Storage};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract StakingRewards {
        function claimed(uint256 epochId, address user) external view returns (bool);
        function vipClaimed(uint256 epochId, address user) external view returns (bool);
    }
}

/// Which epoch of a stream to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochSelector {
    /// Highest store id of the stream.
    Latest,
    /// A specific store id.
    Id(u64),
}

impl FromStr for EpochSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("latest") {
            return Ok(EpochSelector::Latest);
        }
        s.parse::<u64>()
            .map(EpochSelector::Id)
            .map_err(|_| format!("Invalid epoch '{}' (expected 'latest' or an integer)", s))
    }
}

impl fmt::Display for EpochSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpochSelector::Latest => f.write_str("latest"),
            EpochSelector::Id(id) => write!(f, "{}", id),
        }
    }
}

/// Errors surfaced by the resolver.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No epoch matches the selector.
    #[error("No {kind} epoch found for '{selector}'")]
    EpochNotFound {
        /// Reward stream
        kind: EpochKind,
        /// Requested epoch
        selector: EpochSelector,
    },

    /// The address has no allocation in the epoch.
    #[error("Address {address} is not a recipient of {kind} epoch {epoch_id}")]
    NotEligible {
        /// Reward stream
        kind: EpochKind,
        /// Requested address (canonical)
        address: String,
        /// Store id of the epoch
        epoch_id: u64,
    },

    /// The store could not be read.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Where a claim answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimSource {
    /// Read from the contract.
    Chain,
    /// Read from locally indexed claim events.
    Cache,
}

/// Claim status with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimStatus {
    /// Whether the reward was claimed
    pub claimed: bool,
    /// Where the answer came from
    pub source: ClaimSource,
    /// True when the answer may be stale
    pub advisory: bool,
}

impl ClaimStatus {
    /// Authoritative answer from the contract.
    pub fn chain(claimed: bool) -> Self {
        Self {
            claimed,
            source: ClaimSource::Chain,
            advisory: false,
        }
    }

    /// Advisory answer from the local cache.
    pub fn cache(claimed: bool) -> Self {
        Self {
            claimed,
            source: ClaimSource::Cache,
            advisory: true,
        }
    }
}

/// Reads claim flags from the chain.
pub trait ClaimOracle: Send + Sync {
    /// Whether `user` claimed from on-chain epoch `epoch_id` of `kind`.
    fn is_claimed(
        &self,
        kind: EpochKind,
        epoch_id: u64,
        user: Address,
    ) -> impl Future<Output = anyhow::Result<bool>> + Send;
}

/// An unset oracle always fails, which routes every lookup to the cache.
impl<T: ClaimOracle> ClaimOracle for Option<T> {
    async fn is_claimed(&self, kind: EpochKind, epoch_id: u64, user: Address) -> anyhow::Result<bool> {
        match self {
            Some(oracle) => oracle.is_claimed(kind, epoch_id, user).await,
            None => Err(anyhow!("No RPC endpoint configured")),
        }
    }
}

/// Claim oracle backed by the staking contract's `claimed` / `vipClaimed` views.
#[derive(Clone)]
pub struct ContractClaimOracle {
    contract: StakingRewards::StakingRewardsInstance<Http<Client>, RootProvider<Http<Client>>>,
    retry: RetryPolicy,
}

impl ContractClaimOracle {
    /// Connect to `rpc_url` and bind the contract at `address`.
    pub fn new(rpc_url: &str, address: Address, retry: RetryPolicy) -> anyhow::Result<Self> {
        let url = rpc_url
            .parse()
            .with_context(|| format!("Invalid RPC URL: {}", rpc_url))?;
        let provider = ProviderBuilder::new().on_http(url);

        Ok(Self {
            contract: StakingRewards::new(address, provider),
            retry,
        })
    }
}

impl ClaimOracle for ContractClaimOracle {
    async fn is_claimed(&self, kind: EpochKind, epoch_id: u64, user: Address) -> anyhow::Result<bool> {
        let epoch = U256::from(epoch_id);
        match kind {
            EpochKind::Standard => {
                with_retries(&self.retry, "claimed", || async {
                    let result = self
                        .contract
                        .claimed(epoch, user)
                        .call()
                        .await
                        .context("Failed to call claimed()")?;
                    Ok(result._0)
                })
                .await
            }
            EpochKind::Vip => {
                with_retries(&self.retry, "vipClaimed", || async {
                    let result = self
                        .contract
                        .vipClaimed(epoch, user)
                        .call()
                        .await
                        .context("Failed to call vipClaimed()")?;
                    Ok(result._0)
                })
                .await
            }
        }
    }
}

/// A resolved proof with claim status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofResolution {
    /// Store id of the epoch
    pub epoch_id: u64,
    /// Epoch id the contract knows the epoch by
    pub blockchain_epoch_id: u64,
    /// Canonical address
    pub address: String,
    /// Allocated amount (decimal string)
    pub amount: String,
    /// Sibling hashes leaf to root
    pub proof: Vec<B256>,
    /// Root of the epoch
    pub merkle_root: B256,
    /// Shortcut for `claim_status.claimed`
    pub claimed: bool,
    /// Claim status with provenance
    pub claim_status: ClaimStatus,
}

/// Resolves epochs, proofs and claim status.
#[derive(Clone)]
pub struct Resolver<O> {
    storage: Storage,
    oracle: O,
}

impl<O: ClaimOracle> Resolver<O> {
    /// Create a resolver.
    pub fn new(storage: Storage, oracle: O) -> Self {
        Self { storage, oracle }
    }

    /// Load the epoch named by `selector`.
    pub async fn resolve_epoch(
        &self,
        kind: EpochKind,
        selector: EpochSelector,
    ) -> Result<EpochRecord, ResolveError> {
        let epoch = match selector {
            EpochSelector::Latest => self.storage.get_latest_epoch(kind).await?,
            EpochSelector::Id(id) => self.storage.get_epoch(kind, id).await?,
        };
        epoch.ok_or(ResolveError::EpochNotFound { kind, selector })
    }

    /// Claim status of `user` in `epoch`.
    ///
    /// The chain answer wins whenever it is available.
    pub async fn claim_status(
        &self,
        epoch: &EpochRecord,
        user: &Address,
    ) -> Result<ClaimStatus, ResolveError> {
        let onchain_epoch_id = epoch.onchain_epoch_id();

        match self
            .oracle
            .is_claimed(epoch.kind, onchain_epoch_id, *user)
            .await
        {
            Ok(claimed) => Ok(ClaimStatus::chain(claimed)),
            Err(e) => {
                warn!(
                    kind = %epoch.kind,
                    epoch_id = onchain_epoch_id,
                    user = %user,
                    "Chain claim lookup failed, using indexed claims: {:#}",
                    e
                );
                let claimed = self
                    .storage
                    .has_claimed(epoch.kind, onchain_epoch_id, user)
                    .await?;
                Ok(ClaimStatus::cache(claimed))
            }
        }
    }

    /// Proof, amount and claim status for `user` in the selected epoch.
    pub async fn get_proof(
        &self,
        kind: EpochKind,
        user: &Address,
        selector: EpochSelector,
    ) -> Result<ProofResolution, ResolveError> {
        let epoch = self.resolve_epoch(kind, selector).await?;
        let address = canonical_address(user);

        let not_eligible = || ResolveError::NotEligible {
            kind,
            address: address.clone(),
            epoch_id: epoch.id,
        };
        let recipient = epoch.recipient(&address).ok_or_else(not_eligible)?;
        let proof = epoch.proofs.get(&address).ok_or_else(not_eligible)?;

        let claim_status = self.claim_status(&epoch, user).await?;

        Ok(ProofResolution {
            epoch_id: epoch.id,
            blockchain_epoch_id: epoch.onchain_epoch_id(),
            address: address.clone(),
            amount: recipient.amount.clone(),
            proof: proof.clone(),
            merkle_root: epoch.merkle_root,
            claimed: claim_status.claimed,
            claim_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;
    use stakedrop_indexer::distribution::build_epoch;
    use stakedrop_indexer::storage::{
        ReferralCounts, RewardClaimRecord, StakerSnapshot,
    };
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    /// Oracle returning a fixed answer, or failing.
    struct FixedOracle {
        answer: Option<bool>,
        calls: AtomicU32,
    }

    impl FixedOracle {
        fn new(answer: Option<bool>) -> Self {
            Self {
                answer,
                calls: AtomicU32::new(0),
            }
        }
    }

    impl ClaimOracle for FixedOracle {
        async fn is_claimed(&self, _kind: EpochKind, _epoch_id: u64, _user: Address) -> anyhow::Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.ok_or_else(|| anyhow!("rpc down"))
        }
    }

    /// Oracle recording every lookup it answers.
    #[derive(Default)]
    struct RecordingOracle {
        lookups: Mutex<Vec<(EpochKind, u64, Address)>>,
    }

    impl ClaimOracle for RecordingOracle {
        async fn is_claimed(&self, kind: EpochKind, epoch_id: u64, user: Address) -> anyhow::Result<bool> {
            self.lookups.lock().unwrap().push((kind, epoch_id, user));
            Ok(false)
        }
    }

    async fn setup() -> (Storage, NamedTempFile, Address, u64) {
        let temp_db = NamedTempFile::new().unwrap();
        let storage = Storage::new_with_path(temp_db.path(), None, None)
            .await
            .unwrap();
        storage.run_migrations().await.unwrap();

        let user = Address::repeat_byte(0x42);
        let stakers = vec![StakerSnapshot {
            address: user,
            active_stake_usd: 2_000_000_000,
            total_staked_usd: 2_000_000_000,
            active_stakes: 1,
            top_package: None,
            referrals: ReferralCounts::default(),
        }];
        let epoch = build_epoch(EpochKind::Standard, U256::from(10u64), &stakers).unwrap();
        let id = storage.insert_epoch(&epoch).await.unwrap();

        (storage, temp_db, user, id)
    }

    #[test]
    fn test_epoch_selector_parsing() {
        assert_eq!("latest".parse::<EpochSelector>(), Ok(EpochSelector::Latest));
        assert_eq!("LATEST".parse::<EpochSelector>(), Ok(EpochSelector::Latest));
        assert_eq!("12".parse::<EpochSelector>(), Ok(EpochSelector::Id(12)));
        assert!("-1".parse::<EpochSelector>().is_err());
    }

    #[tokio::test]
    async fn test_chain_answer_wins_over_cache() {
        let (storage, _temp_db, user, id) = setup().await;

        // The cache says claimed, the chain says not
        storage
            .record_claim(&RewardClaimRecord {
                user,
                epoch_id: id,
                kind: EpochKind::Standard,
                amount: U256::from(10u64),
                tx_hash: None,
                block_number: None,
            })
            .await
            .unwrap();

        let resolver = Resolver::new(storage.clone(), FixedOracle::new(Some(false)));
        let resolved = resolver
            .get_proof(EpochKind::Standard, &user, EpochSelector::Latest)
            .await
            .unwrap();

        assert_eq!(resolved.claim_status, ClaimStatus::chain(false));
        assert!(!resolved.claimed);
        assert_eq!(resolved.amount, "10");
        assert_eq!(resolved.epoch_id, id);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_cache_used_only_on_chain_failure() {
        let (storage, _temp_db, user, id) = setup().await;
        storage
            .record_claim(&RewardClaimRecord {
                user,
                epoch_id: id,
                kind: EpochKind::Standard,
                amount: U256::from(10u64),
                tx_hash: None,
                block_number: None,
            })
            .await
            .unwrap();

        let oracle = FixedOracle::new(None);
        let resolver = Resolver::new(storage.clone(), oracle);
        let resolved = resolver
            .get_proof(EpochKind::Standard, &user, EpochSelector::Id(id))
            .await
            .unwrap();

        assert_eq!(resolved.claim_status, ClaimStatus::cache(true));
        assert!(resolved.claim_status.advisory);
        assert_eq!(resolver.oracle.calls.load(Ordering::SeqCst), 1);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_claim_lookup_uses_published_epoch_id() {
        let (storage, _temp_db, user, id) = setup().await;
        storage
            .set_blockchain_epoch_id(EpochKind::Standard, id, 9)
            .await
            .unwrap();

        // Claim indexed under the on-chain id
        storage
            .record_claim(&RewardClaimRecord {
                user,
                epoch_id: 9,
                kind: EpochKind::Standard,
                amount: U256::from(10u64),
                tx_hash: None,
                block_number: None,
            })
            .await
            .unwrap();

        let resolver = Resolver::new(storage.clone(), None::<FixedOracle>);
        let resolved = resolver
            .get_proof(EpochKind::Standard, &user, EpochSelector::Latest)
            .await
            .unwrap();

        assert_eq!(resolved.blockchain_epoch_id, 9);
        assert_eq!(resolved.claim_status, ClaimStatus::cache(true));

        storage.close().await;
    }

    #[tokio::test]
    async fn test_vip_claim_lookup_uses_vip_epoch_number() {
        let (storage, _temp_db, user, _id) = setup().await;

        let standard = vec![StakerSnapshot {
            address: user,
            active_stake_usd: 2_000_000_000,
            total_staked_usd: 2_000_000_000,
            active_stakes: 1,
            top_package: None,
            referrals: ReferralCounts::default(),
        }];
        let second = build_epoch(EpochKind::Standard, U256::from(20u64), &standard).unwrap();
        assert_eq!(storage.insert_epoch(&second).await.unwrap(), 2);

        let vip_user = Address::repeat_byte(0x77);
        let vip = vec![StakerSnapshot {
            address: vip_user,
            active_stake_usd: 500_000_000,
            total_staked_usd: 500_000_000,
            active_stakes: 1,
            top_package: None,
            referrals: ReferralCounts {
                direct: 40,
                indirect: 60,
            },
        }];
        let vip_epoch = build_epoch(EpochKind::Vip, U256::from(30u64), &vip).unwrap();
        let vip_id = storage.insert_epoch(&vip_epoch).await.unwrap();
        assert_eq!(vip_id, 1);

        let resolver = Resolver::new(storage.clone(), RecordingOracle::default());
        let resolved = resolver
            .get_proof(EpochKind::Vip, &vip_user, EpochSelector::Latest)
            .await
            .unwrap();
        assert_eq!(resolved.epoch_id, 1);
        assert_eq!(resolved.blockchain_epoch_id, 1);
        assert_eq!(resolved.amount, "30");

        let by_id = resolver
            .get_proof(EpochKind::Vip, &vip_user, EpochSelector::Id(1))
            .await
            .unwrap();
        assert_eq!(by_id.merkle_root, vip_epoch.merkle_root);

        // vipClaimed is asked about VIP epoch 1, not the third epoch overall
        assert_eq!(
            *resolver.oracle.lookups.lock().unwrap(),
            vec![(EpochKind::Vip, 1, vip_user), (EpochKind::Vip, 1, vip_user)]
        );

        storage.close().await;
    }

    #[tokio::test]
    async fn test_not_found_errors() {
        let (storage, _temp_db, _user, id) = setup().await;
        let resolver = Resolver::new(storage.clone(), FixedOracle::new(Some(false)));

        let err = resolver
            .get_proof(EpochKind::Vip, &Address::repeat_byte(0x42), EpochSelector::Latest)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::EpochNotFound { .. }));

        let err = resolver
            .get_proof(EpochKind::Standard, &Address::repeat_byte(0x01), EpochSelector::Id(id))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotEligible { .. }));

        let err = resolver
            .get_proof(EpochKind::Standard, &Address::repeat_byte(0x42), EpochSelector::Id(id + 5))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::EpochNotFound { .. }));

        storage.close().await;
    }

    #[tokio::test]
    async fn test_contract_oracle_unreachable_rpc_fails() {
        let oracle = ContractClaimOracle::new(
            "http://127.0.0.1:1",
            Address::repeat_byte(0x99),
            RetryPolicy {
                attempts: 1,
                backoff: std::time::Duration::ZERO,
                timeout: std::time::Duration::from_secs(5),
            },
        )
        .unwrap();

        assert!(oracle
            .is_claimed(EpochKind::Vip, 1, Address::repeat_byte(1))
            .await
            .is_err());
    }
}
