//! Chain indexing, referral maintenance and epoch generation for Stakedrop.
//!
//! This crate provides:
//! - An event listener for the staking contract with a durable cursor
//! - Idempotent handlers for locks, withdrawals, referrals and claims
//! - Referral graph maintenance (direct and indirect counts)
//! - Eligibility, reward distribution and epoch generation
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  stakedrop-indexer (this)    │
//! │                              │
//! │  ┌─────────────────┐         │
//! │  │  Sync Engine    │ ← JSON-RPC
//! │  │   (tokio task)  │   staking events
//! │  └────────┬────────┘         │
//! │           │                  │
//! │      ┌────▼──────┐           │
//! │      │  Storage  │ ← SQLite  │
//! │      └────┬──────┘           │
//! │           │                  │
//! │   ┌───────▼────────┐         │
//! │   │ Epoch generator│ ← CLI   │
//! │   └────────────────┘         │
//! └──────────────────────────────┘
//!          │
//!          │ Shared DB
//!          │
//! ┌────────▼──────────────────────┐
//! │   stakedrop-api (separate)    │
//! │   proofs, eligibility, epochs │
//! └───────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod distribution;
pub mod listener;
pub mod referral;
pub mod storage;

pub use distribution::{generate_epoch, DistributionError, GeneratedEpoch};
pub use referral::{ReferralForest, ReferralMaintainer};
