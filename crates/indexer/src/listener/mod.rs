//! Event listener for the staking contract.
//!
//! This module provides:
//! - Event type definitions and parsing
//! - RPC provider wrapper with bounded retries
//! - Sync engine and idempotent event handlers

pub mod events;
pub mod provider;
pub mod retry;
pub mod sync;

pub use events::{ChainEvent, StakingEvent};
pub use provider::{EventSource, RpcProvider};
pub use retry::{with_retries, RetryPolicy};
pub use sync::{BatchSummary, EventHandler, SyncEngine};
