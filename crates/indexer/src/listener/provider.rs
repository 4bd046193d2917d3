//! RPC provider wrapper for chain communication.

use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{Filter, Log};
use alloy::transports::http::{Client, Http};
use anyhow::{Context, Result};
use std::future::Future;
use tracing::{debug, warn};

use super::events::{sort_chain_order, ChainEvent, WATCHED_EVENTS};
use super::retry::{with_retries, RetryPolicy};

/// HTTP RPC provider for querying the staking contract.
#[derive(Clone)]
pub struct RpcProvider {
    provider: RootProvider<Http<Client>>,
    staking_address: Address,
    retry: RetryPolicy,
}

impl RpcProvider {
    /// Create a new RPC provider.
    pub fn new(rpc_url: &str, staking_address: Address, retry: RetryPolicy) -> Result<Self> {
        let url = rpc_url
            .parse()
            .with_context(|| format!("Invalid RPC URL: {}", rpc_url))?;

        let provider = ProviderBuilder::new().on_http(url);

        Ok(Self {
            provider,
            staking_address,
            retry,
        })
    }

    /// Underlying alloy provider.
    pub fn inner(&self) -> &RootProvider<Http<Client>> {
        &self.provider
    }

    /// Get the latest block number.
    pub async fn get_block_number(&self) -> Result<u64> {
        with_retries(&self.retry, "eth_blockNumber", || async {
            self.provider
                .get_block_number()
                .await
                .context("Failed to get block number")
        })
        .await
    }

    /// Get the chain id reported by the node.
    pub async fn get_chain_id(&self) -> Result<u64> {
        with_retries(&self.retry, "eth_chainId", || async {
            self.provider
                .get_chain_id()
                .await
                .context("Failed to get chain id")
        })
        .await
    }

    /// Fetch every watched event in `[from_block, to_block]`.
    ///
    /// One `eth_getLogs` per event type runs concurrently; any failed fetch
    /// fails the whole range. Logs that cannot be decoded are skipped with a
    /// warning. The result is in chain order.
    pub async fn get_events(&self, from_block: u64, to_block: u64) -> Result<Vec<ChainEvent>> {
        let [locked, referrer_set, withdrawn, claimed, vip_claimed, funded, vip_funded] =
            WATCHED_EVENTS;

        let batches = tokio::try_join!(
            self.get_logs_for(locked, from_block, to_block),
            self.get_logs_for(referrer_set, from_block, to_block),
            self.get_logs_for(withdrawn, from_block, to_block),
            self.get_logs_for(claimed, from_block, to_block),
            self.get_logs_for(vip_claimed, from_block, to_block),
            self.get_logs_for(funded, from_block, to_block),
            self.get_logs_for(vip_funded, from_block, to_block),
        )?;

        let logs = [
            batches.0, batches.1, batches.2, batches.3, batches.4, batches.5, batches.6,
        ];

        let mut events = Vec::new();
        for log in logs.iter().flatten() {
            match ChainEvent::from_log(log) {
                Ok(event) => events.push(event),
                Err(e) => {
                    // Log parsing error but continue processing other events
                    warn!("Failed to parse staking event: {:#}", e);
                }
            }
        }

        sort_chain_order(&mut events);
        debug!(from_block, to_block, count = events.len(), "Fetched events");

        Ok(events)
    }

    async fn get_logs_for(&self, signature: B256, from_block: u64, to_block: u64) -> Result<Vec<Log>> {
        let filter = Filter::new()
            .address(self.staking_address)
            .event_signature(signature)
            .from_block(from_block)
            .to_block(to_block);

        with_retries(&self.retry, "eth_getLogs", || async {
            self.provider
                .get_logs(&filter)
                .await
                .context("Failed to fetch logs from RPC")
        })
        .await
    }
}

/// Where the sync engine reads chain state from.
pub trait EventSource: Send + Sync {
    /// Latest block number.
    fn get_block_number(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Chain id of the node.
    fn get_chain_id(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Every watched event in `[from_block, to_block]`, in chain order.
    fn get_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = Result<Vec<ChainEvent>>> + Send;
}

impl EventSource for RpcProvider {
    async fn get_block_number(&self) -> Result<u64> {
        RpcProvider::get_block_number(self).await
    }

    async fn get_chain_id(&self) -> Result<u64> {
        RpcProvider::get_chain_id(self).await
    }

    async fn get_events(&self, from_block: u64, to_block: u64) -> Result<Vec<ChainEvent>> {
        RpcProvider::get_events(self, from_block, to_block).await
    }
}
