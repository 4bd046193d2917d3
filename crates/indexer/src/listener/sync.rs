//! Sync engine and event handlers.

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use std::fmt;
use tracing::{debug, info, warn};

use super::events::{ChainEvent, StakingEvent};
use super::provider::{EventSource, RpcProvider};
use crate::config::Config;
use crate::referral::ReferralMaintainer;
use crate::storage::{
    ReferrerUpdate, RewardClaimRecord, StakeRecord, Storage, WithdrawOutcome,
};
use stakedrop_core::{usd_micros_from_u256, Package, StakeStatus};

/// Result of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// State changed.
    Applied,
    /// Event was already reflected in the store (replay) or had no effect.
    Skipped,
}

/// Per-batch counters, logged after every applied range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Events that changed state
    pub applied: u64,
    /// Events with no effect
    pub skipped: u64,
    /// Events whose handler failed and were dropped
    pub failed: u64,
}

impl BatchSummary {
    /// Total events seen.
    pub fn total(&self) -> u64 {
        self.applied + self.skipped + self.failed
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} applied, {} skipped, {} failed",
            self.applied, self.skipped, self.failed
        )
    }
}

/// Applies decoded chain events to the store.
///
/// Every handler is idempotent, so re-applying a block range after a crash or
/// an operator rewind leaves the store unchanged.
#[derive(Debug, Clone)]
pub struct EventHandler {
    storage: Storage,
    referrals: ReferralMaintainer,
}

impl EventHandler {
    /// Create a handler writing to `storage`.
    pub fn new(storage: Storage) -> Self {
        let referrals = ReferralMaintainer::new(storage.clone());
        Self { storage, referrals }
    }

    /// Apply events in the given order.
    ///
    /// Handler failures are logged and counted but never abort the batch.
    pub async fn apply_events(&self, events: &[ChainEvent]) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for event in events {
            match self.apply(event).await {
                Ok(HandlerOutcome::Applied) => summary.applied += 1,
                Ok(HandlerOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(
                        event = event.event.name(),
                        block = event.coordinates.block_number,
                        log_index = event.coordinates.log_index,
                        tx = %event.tx_hash,
                        "Dropping event: {:#}",
                        e
                    );
                }
            }
        }

        summary
    }

    /// Apply one event.
    pub async fn apply(&self, event: &ChainEvent) -> Result<HandlerOutcome> {
        match &event.event {
            StakingEvent::Locked {
                user,
                lock_id,
                token_amount,
                usd_value,
                package_id,
                start_time,
                end_time,
            } => {
                let stake = StakeRecord {
                    user: *user,
                    lock_id: *lock_id,
                    amount_usd: usd_micros_from_u256(*usd_value)?,
                    token_amount: *token_amount,
                    package: Package::from_id(*package_id)?,
                    start_time: u256_to_u64(*start_time, "startTime")?,
                    end_time: u256_to_u64(*end_time, "endTime")?,
                    status: StakeStatus::Active,
                    tx_hash: event.tx_hash,
                    block_number: event.coordinates.block_number,
                    log_index: event.coordinates.log_index,
                };
                self.handle_locked(&stake).await
            }
            StakingEvent::ReferrerSet { user, referrer } => {
                self.handle_referrer_set(user, referrer).await
            }
            StakingEvent::Withdrawn { user, lock_id, .. } => {
                self.handle_withdrawn(user, *lock_id).await
            }
            StakingEvent::RewardClaimed {
                kind,
                user,
                epoch_id,
                amount,
            } => {
                let claim = RewardClaimRecord {
                    user: *user,
                    epoch_id: u256_to_u64(*epoch_id, "epochId")?,
                    kind: *kind,
                    amount: *amount,
                    tx_hash: Some(event.tx_hash),
                    block_number: Some(event.coordinates.block_number),
                };
                self.handle_reward_claimed(&claim).await
            }
            StakingEvent::TokensFunded {
                kind,
                funder,
                amount,
            } => {
                info!(
                    pool = %kind,
                    funder = %funder,
                    amount = %amount,
                    block = event.coordinates.block_number,
                    "Reward pool funded"
                );
                Ok(HandlerOutcome::Applied)
            }
        }
    }

    async fn handle_locked(&self, stake: &StakeRecord) -> Result<HandlerOutcome> {
        if self.storage.record_lock(stake).await? {
            debug!(
                user = %stake.user,
                lock_id = %stake.lock_id,
                amount_usd = stake.amount_usd,
                package = stake.package.name(),
                "Stake recorded"
            );
            Ok(HandlerOutcome::Applied)
        } else {
            Ok(HandlerOutcome::Skipped)
        }
    }

    async fn handle_referrer_set(
        &self,
        user: &Address,
        referrer: &Address,
    ) -> Result<HandlerOutcome> {
        if user == referrer {
            warn!(user = %user, "Ignoring self-referral");
            return Ok(HandlerOutcome::Skipped);
        }

        let outcome = match self.storage.set_referrer(user, referrer).await? {
            ReferrerUpdate::Set => HandlerOutcome::Applied,
            // Replays refresh too; counts left stale by a failed refresh heal here
            ReferrerUpdate::Unchanged => HandlerOutcome::Skipped,
            ReferrerUpdate::Conflict(existing) => {
                debug!(user = %user, referrer = %referrer, existing = %existing, "Referrer already set");
                return Ok(HandlerOutcome::Skipped);
            }
        };

        let refreshed = self
            .referrals
            .refresh_user(user)
            .await
            .context("Failed to refresh referral counts")?;
        debug!(user = %user, referrer = %referrer, refreshed, "Referral counts refreshed");

        Ok(outcome)
    }

    async fn handle_withdrawn(&self, user: &Address, lock_id: U256) -> Result<HandlerOutcome> {
        match self.storage.record_withdrawal(user, lock_id).await? {
            WithdrawOutcome::Withdrawn(amount_usd) => {
                debug!(user = %user, lock_id = %lock_id, amount_usd, "Stake withdrawn");
                Ok(HandlerOutcome::Applied)
            }
            WithdrawOutcome::AlreadyWithdrawn => Ok(HandlerOutcome::Skipped),
            WithdrawOutcome::NotFound => {
                anyhow::bail!("No stake {} for user {}", lock_id, user)
            }
        }
    }

    async fn handle_reward_claimed(&self, claim: &RewardClaimRecord) -> Result<HandlerOutcome> {
        if self.storage.record_claim(claim).await? {
            Ok(HandlerOutcome::Applied)
        } else {
            Ok(HandlerOutcome::Skipped)
        }
    }
}

fn u256_to_u64(value: U256, field: &str) -> Result<u64> {
    u64::try_from(value).with_context(|| format!("{} out of range: {}", field, value))
}

/// A block range that has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncedRange {
    /// First block of the range
    pub from_block: u64,
    /// Last block of the range (inclusive)
    pub to_block: u64,
    /// Confirmed head at the time of the poll
    pub head: u64,
    /// Handler counters
    pub summary: BatchSummary,
}

/// Sync engine polls the chain and applies new events in order.
pub struct SyncEngine<S = RpcProvider> {
    provider: S,
    storage: Storage,
    handler: EventHandler,
    config: Config,
}

impl<S: EventSource> SyncEngine<S> {
    /// Create a new sync engine.
    pub fn new(provider: S, storage: Storage, config: Config) -> Self {
        let handler = EventHandler::new(storage.clone());
        Self {
            provider,
            storage,
            handler,
            config,
        }
    }

    /// Seed the cursor on a fresh store and check the chain id otherwise.
    pub async fn initialize_cursor(&self) -> Result<u64> {
        let state = self.storage.get_sync_state().await?;
        let chain_id = self.config.network.chain_id;

        if state.initialized {
            if state.chain_id != chain_id {
                anyhow::bail!(
                    "Database was indexed for chain {} but config says {}",
                    state.chain_id,
                    chain_id
                );
            }
            info!(next_block = state.next_block, "Resuming from stored cursor");
            return Ok(state.next_block);
        }

        let node_chain_id = self.provider.get_chain_id().await?;
        if node_chain_id != chain_id {
            anyhow::bail!(
                "RPC node reports chain {} but config says {}",
                node_chain_id,
                chain_id
            );
        }

        let next_block = match self.config.sync.start_block {
            Some(start_block) => start_block,
            None => {
                let height = self.provider.get_block_number().await?;
                height.saturating_sub(self.config.sync.cold_start_lookback)
            }
        };

        self.storage
            .initialize_sync_state(chain_id, next_block)
            .await?;
        info!(next_block, chain_id, "Initialized sync cursor");

        Ok(next_block)
    }

    /// Run one poll: fetch and apply the next range if the head moved.
    ///
    /// Returns `None` when there is nothing new. The cursor only advances after
    /// the whole range was fetched and applied.
    pub async fn sync_once(&self) -> Result<Option<SyncedRange>> {
        let state = self.storage.get_sync_state().await?;
        let current_block = self.provider.get_block_number().await?;
        let head = current_block.saturating_sub(self.config.sync.confirmations);

        let from_block = state.next_block;
        let to_block = from_block
            .saturating_add(self.config.sync.batch_size)
            .min(head);

        if to_block < from_block {
            return Ok(None);
        }

        let events = self
            .provider
            .get_events(from_block, to_block)
            .await
            .with_context(|| format!("Failed to fetch events for blocks {} to {}", from_block, to_block))?;

        let summary = self.handler.apply_events(&events).await;

        self.storage.update_cursor(to_block + 1).await?;

        info!(
            from_block,
            to_block,
            head,
            applied = summary.applied,
            skipped = summary.skipped,
            failed = summary.failed,
            "Batch complete"
        );

        Ok(Some(SyncedRange {
            from_block,
            to_block,
            head,
            summary,
        }))
    }

    /// Run the sync loop.
    ///
    /// Runs until the task is cancelled. While behind, ranges are processed
    /// back to back; once caught up the engine sleeps for the poll interval.
    pub async fn run(&self) -> Result<()> {
        info!("Sync engine starting...");
        self.initialize_cursor().await?;

        let poll_interval = self.config.sync.poll_interval();

        loop {
            match self.sync_once().await {
                Ok(Some(range)) if range.to_block < range.head => continue,
                Ok(_) => {}
                Err(e) => {
                    warn!("Sync cycle failed, cursor not advanced: {:#}", e);
                }
            }

            tokio::time::sleep(poll_interval).await;
        }
    }
}
