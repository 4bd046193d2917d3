//! Core types for Stakedrop.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{MICROS_PER_USD, REFERRAL_CODE_LEN};
use crate::error::CoreError;
use crate::hashing::keccak256;

/// Canonical string form of an address: `0x` followed by 40 lowercase hex characters.
///
/// Wallet addresses are case-insensitive; this form is the storage key for
/// users, stakes and proofs.
pub fn canonical_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

/// Parse an address in any letter case (checksum is not enforced).
pub fn parse_address(input: &str) -> Result<Address, CoreError> {
    let trimmed = input.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if hex_part.len() != 40 {
        return Err(CoreError::InvalidAddress(input.to_string()));
    }

    let bytes = hex::decode(hex_part).map_err(|_| CoreError::InvalidAddress(input.to_string()))?;
    Ok(Address::from_slice(&bytes))
}

/// Derive the display referral code for an address.
///
/// Upper-case hex of the first bytes of `keccak256(address)`.
pub fn referral_code(address: &Address) -> String {
    let hash = keccak256(address.as_slice());
    let mut code = hex::encode_upper(hash.as_slice());
    code.truncate(REFERRAL_CODE_LEN);
    code
}

/// Convert stored micro-USD to whole USD (truncating).
pub const fn micros_to_whole_usd(micros: u64) -> u64 {
    micros / MICROS_PER_USD
}

/// Convert stored micro-USD to a floating point USD value for display.
pub fn micros_to_usd(micros: u64) -> f64 {
    micros as f64 / MICROS_PER_USD as f64
}

/// Narrow an on-chain micro-USD value to the stored representation.
///
/// Stored values must fit a signed 64-bit column.
pub fn usd_micros_from_u256(value: U256) -> Result<u64, CoreError> {
    u64::try_from(value)
        .ok()
        .filter(|micros| *micros <= i64::MAX as u64)
        .ok_or_else(|| CoreError::InvalidAmount(value.to_string()))
}

/// Parse a positive integer token amount given as a decimal string.
///
/// Pools are passed as strings because they routinely exceed `u64`.
pub fn parse_token_amount(input: &str) -> Result<U256, CoreError> {
    let trimmed = input.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(CoreError::InvalidAmount(input.to_string()));
    }
    U256::from_str_radix(trimmed, 10).map_err(|_| CoreError::InvalidAmount(input.to_string()))
}

/// Reward stream an epoch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochKind {
    /// Stake-weighted pool gated by package referral requirements.
    Standard,

    /// Pool for users with a large referral network.
    Vip,
}

impl EpochKind {
    /// Convert to database string representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            EpochKind::Standard => "standard",
            EpochKind::Vip => "vip",
        }
    }
}

impl fmt::Display for EpochKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EpochKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(EpochKind::Standard),
            "vip" => Ok(EpochKind::Vip),
            _ => Err(CoreError::UnknownEpochKind(s.to_string())),
        }
    }
}

/// Lifecycle of one on-chain lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakeStatus {
    /// Tokens are locked.
    Active,

    /// Tokens were withdrawn; terminal.
    Withdrawn,
}

impl StakeStatus {
    /// Convert to database string representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            StakeStatus::Active => "active",
            StakeStatus::Withdrawn => "withdrawn",
        }
    }
}

impl FromStr for StakeStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(StakeStatus::Active),
            "withdrawn" => Ok(StakeStatus::Withdrawn),
            _ => Err(CoreError::UnknownStakeStatus(s.to_string())),
        }
    }
}

/// Staking package selected when locking.
///
/// Packages are informational: eligibility resolves through the user's total
/// staked USD, not through the package of an individual lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Package {
    /// Package 0.
    Starter,
    /// Package 1.
    Bronze,
    /// Package 2.
    Silver,
    /// Package 3.
    Gold,
}

impl Package {
    /// All packages in id order.
    pub const ALL: [Package; 4] = [
        Package::Starter,
        Package::Bronze,
        Package::Silver,
        Package::Gold,
    ];

    /// Look up a package by its on-chain id.
    pub fn from_id(id: u8) -> Result<Self, CoreError> {
        Self::ALL
            .get(id as usize)
            .copied()
            .ok_or(CoreError::UnknownPackage(id))
    }

    /// On-chain package id.
    pub const fn id(&self) -> u8 {
        match self {
            Package::Starter => 0,
            Package::Bronze => 1,
            Package::Silver => 2,
            Package::Gold => 3,
        }
    }

    /// Display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Package::Starter => "starter",
            Package::Bronze => "bronze",
            Package::Silver => "silver",
            Package::Gold => "gold",
        }
    }

    /// Minimum lock value in whole USD.
    pub const fn min_usd(&self) -> u64 {
        match self {
            Package::Starter => 10,
            Package::Bronze => 100,
            Package::Silver => 1_000,
            Package::Gold => 5_000,
        }
    }

    /// Direct referrals advertised for the package.
    pub const fn required_referrals(&self) -> u64 {
        match self {
            Package::Starter => 10,
            Package::Bronze => 5,
            Package::Silver | Package::Gold => 0,
        }
    }
}

impl TryFrom<u8> for Package {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Package::from_id(value)
    }
}

impl From<Package> for u8 {
    fn from(value: Package) -> Self {
        value.id()
    }
}
