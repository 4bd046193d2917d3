//! Platform constants.
//!
//! Thresholds here gate reward eligibility. Changing any of them changes which
//! addresses appear in the next epoch, so they are kept in one place.

/// Decimals used for USD valuations carried by `Locked` events and stored on stakes.
pub const USD_DECIMALS: u32 = 6;

/// One whole USD expressed in stored micro-USD units.
pub const MICROS_PER_USD: u64 = 1_000_000;

/// Total staked (whole USD) from which no referrals are required.
pub const NO_REFERRALS_REQUIRED_USD: u64 = 1_000;

/// Total staked (whole USD) from which the reduced referral requirement applies.
pub const REDUCED_REFERRALS_USD: u64 = 100;

/// Direct referrals required below [`REDUCED_REFERRALS_USD`].
pub const BASE_REQUIRED_REFERRALS: u64 = 10;

/// Direct referrals required between [`REDUCED_REFERRALS_USD`] and [`NO_REFERRALS_REQUIRED_USD`].
pub const REDUCED_REQUIRED_REFERRALS: u64 = 5;

/// Minimum total (direct + indirect) referrals for the VIP pool.
pub const VIP_MIN_TOTAL_REFERRALS: u64 = 100;

/// Depth below a user counted into its referral totals.
///
/// Depth 1 is "direct"; depths 2 and 3 together form "indirect".
pub const REFERRAL_DEPTH: usize = 3;

/// Number of hex characters in a derived referral code.
pub const REFERRAL_CODE_LEN: usize = 12;
