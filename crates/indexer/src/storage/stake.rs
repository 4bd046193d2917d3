//! Stake storage operations.

use super::user::ensure_user_on;
use super::{address_column, u256_column, StakeRecord, Storage, WithdrawOutcome};
use alloy::primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use sqlx::Row;
use stakedrop_core::{canonical_address, Package, StakeStatus};

impl Storage {
    /// Record a new lock.
    ///
    /// The stake row and the owner's `total_staked_usd` move together: the
    /// total is only increased when the row is actually inserted, so replaying
    /// the same Locked event is a no-op. Returns true when the stake was new.
    pub async fn record_lock(&self, stake: &StakeRecord) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let user = canonical_address(&stake.user);
        let mut tx = self.pool.begin().await?;

        ensure_user_on(&mut tx, &stake.user, now).await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO stakes (
                user_address, lock_id, amount_usd, token_amount, package_id,
                start_time, end_time, status, tx_hash, block_number, log_index,
                created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_address, lock_id) DO NOTHING
            "#,
        )
        .bind(&user)
        .bind(stake.lock_id.to_string())
        .bind(stake.amount_usd as i64)
        .bind(stake.token_amount.to_string())
        .bind(stake.package.id() as i64)
        .bind(stake.start_time as i64)
        .bind(stake.end_time as i64)
        .bind(stake.status.as_str())
        .bind(stake.tx_hash.as_slice())
        .bind(stake.block_number as i64)
        .bind(stake.log_index as i64)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to insert stake")?
        .rows_affected()
            == 1;

        if inserted && stake.status == StakeStatus::Active {
            sqlx::query(
                r#"
                UPDATE users
                SET total_staked_usd = total_staked_usd + ?, updated_at = ?
                WHERE address = ?
                "#,
            )
            .bind(stake.amount_usd as i64)
            .bind(now)
            .bind(&user)
            .execute(&mut *tx)
            .await
            .context("Failed to increase total staked")?;
        }

        tx.commit().await?;

        Ok(inserted)
    }

    /// Mark a lock as withdrawn.
    ///
    /// Only an active-to-withdrawn transition releases the stake value from the
    /// owner's total, and the total never drops below zero.
    pub async fn record_withdrawal(&self, user: &Address, lock_id: U256) -> Result<WithdrawOutcome> {
        let now = chrono::Utc::now().timestamp();
        let user = canonical_address(user);
        let lock_id = lock_id.to_string();
        let mut tx = self.pool.begin().await?;

        let released: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE stakes
            SET status = 'withdrawn', withdrawn_at = ?
            WHERE user_address = ? AND lock_id = ? AND status = 'active'
            RETURNING amount_usd
            "#,
        )
        .bind(now)
        .bind(&user)
        .bind(&lock_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to mark stake withdrawn")?;

        let outcome = match released {
            Some(amount_usd) => {
                sqlx::query(
                    r#"
                    UPDATE users
                    SET total_staked_usd = MAX(total_staked_usd - ?, 0), updated_at = ?
                    WHERE address = ?
                    "#,
                )
                .bind(amount_usd)
                .bind(now)
                .bind(&user)
                .execute(&mut *tx)
                .await
                .context("Failed to decrease total staked")?;

                WithdrawOutcome::Withdrawn(amount_usd as u64)
            }
            None => {
                let exists: Option<i64> = sqlx::query_scalar(
                    "SELECT 1 FROM stakes WHERE user_address = ? AND lock_id = ?",
                )
                .bind(&user)
                .bind(&lock_id)
                .fetch_optional(&mut *tx)
                .await?;

                if exists.is_some() {
                    WithdrawOutcome::AlreadyWithdrawn
                } else {
                    WithdrawOutcome::NotFound
                }
            }
        };

        tx.commit().await?;

        Ok(outcome)
    }

    /// Get a single stake.
    pub async fn get_stake(&self, user: &Address, lock_id: U256) -> Result<Option<StakeRecord>> {
        let row = sqlx::query(
            r#"
            SELECT user_address, lock_id, amount_usd, token_amount, package_id,
                   start_time, end_time, status, tx_hash, block_number, log_index
            FROM stakes
            WHERE user_address = ? AND lock_id = ?
            "#,
        )
        .bind(canonical_address(user))
        .bind(lock_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch stake")?;

        row.map(Self::row_to_stake_record).transpose()
    }

    /// All stakes of a user in chain order.
    pub async fn get_stakes_for_user(&self, user: &Address) -> Result<Vec<StakeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT user_address, lock_id, amount_usd, token_amount, package_id,
                   start_time, end_time, status, tx_hash, block_number, log_index
            FROM stakes
            WHERE user_address = ?
            ORDER BY block_number ASC, log_index ASC
            "#,
        )
        .bind(canonical_address(user))
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch stakes")?;

        rows.into_iter().map(Self::row_to_stake_record).collect()
    }

    /// Helper function to convert a database row to a StakeRecord.
    fn row_to_stake_record(row: sqlx::sqlite::SqliteRow) -> Result<StakeRecord> {
        let user: String = row.get("user_address");
        let lock_id: String = row.get("lock_id");
        let token_amount: String = row.get("token_amount");
        let status: String = row.get("status");
        let tx_hash_bytes: Vec<u8> = row.get("tx_hash");

        if tx_hash_bytes.len() != 32 {
            anyhow::bail!("Corrupt tx_hash column: {} bytes", tx_hash_bytes.len());
        }

        Ok(StakeRecord {
            user: address_column(&user)?,
            lock_id: u256_column(&lock_id)?,
            amount_usd: row.get::<i64, _>("amount_usd") as u64,
            token_amount: u256_column(&token_amount)?,
            package: Package::from_id(row.get::<i64, _>("package_id") as u8)?,
            start_time: row.get::<i64, _>("start_time") as u64,
            end_time: row.get::<i64, _>("end_time") as u64,
            status: status.parse::<StakeStatus>()?,
            tx_hash: B256::from_slice(&tx_hash_bytes),
            block_number: row.get::<i64, _>("block_number") as u64,
            log_index: row.get::<i64, _>("log_index") as u64,
        })
    }
}
