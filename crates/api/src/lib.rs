//! Axum-based API server for Stakedrop.
//!
//! This crate provides:
//! - `/v1/eligible/{standard,vip}` - Stakers currently eligible for each pool
//! - `/v1/proof/{standard,vip}/:address` - Merkle proof and claim status for an epoch
//! - `/v1/epochs/...` - Epoch generation, listing and publication bookkeeping
//! - `/v1/users/:address` - User aggregates, referral counts and stakes
//! - `/v1/referrals/recalculate` - Full referral count sweep

#![warn(missing_docs)]

pub mod resolver;
/// API server runtime and in-process app builder.
pub mod server;
