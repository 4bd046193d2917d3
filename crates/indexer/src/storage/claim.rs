//! Reward claim storage operations.
//!
//! Claims are recorded from chain events for auditing. The contract remains the
//! source of truth for whether a reward was claimed.

use super::{RewardClaimRecord, Storage};
use alloy::primitives::Address;
use anyhow::{Context, Result};
use stakedrop_core::{canonical_address, EpochKind};

impl Storage {
    /// Record an observed claim. Returns true when the claim was new.
    pub async fn record_claim(&self, claim: &RewardClaimRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO reward_claims (
                user_address, epoch_id, kind, amount, tx_hash, block_number, claimed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_address, epoch_id, kind) DO NOTHING
            "#,
        )
        .bind(canonical_address(&claim.user))
        .bind(claim.epoch_id as i64)
        .bind(claim.kind.as_str())
        .bind(claim.amount.to_string())
        .bind(claim.tx_hash.as_ref().map(|h| h.as_slice()))
        .bind(claim.block_number.map(|b| b as i64))
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .context("Failed to record claim")?;

        Ok(result.rows_affected() == 1)
    }

    /// Whether a claim for `(kind, onchain_epoch_id, user)` was observed locally.
    pub async fn has_claimed(
        &self,
        kind: EpochKind,
        onchain_epoch_id: u64,
        user: &Address,
    ) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT 1 FROM reward_claims
            WHERE user_address = ? AND epoch_id = ? AND kind = ?
            "#,
        )
        .bind(canonical_address(user))
        .bind(onchain_epoch_id as i64)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query claims")?;

        Ok(found.is_some())
    }
}
