//! Sync state storage operations.

use super::{Storage, SyncState};
use anyhow::{Context, Result};
use sqlx::Row;

impl Storage {
    /// Get the current sync state.
    pub async fn get_sync_state(&self) -> Result<SyncState> {
        let row = sqlx::query(
            r#"
            SELECT next_block, chain_id, initialized, updated_at
            FROM sync_state
            WHERE id = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to fetch sync state")?;

        Ok(SyncState {
            next_block: row.get::<i64, _>("next_block") as u64,
            chain_id: row.get::<i64, _>("chain_id") as u64,
            initialized: row.get::<i64, _>("initialized") != 0,
            updated_at: row.get("updated_at"),
        })
    }

    /// Seed the cursor on first start.
    pub async fn initialize_sync_state(&self, chain_id: u64, next_block: u64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE sync_state
            SET next_block = ?,
                chain_id = ?,
                initialized = 1,
                updated_at = ?
            WHERE id = 1
            "#,
        )
        .bind(next_block as i64)
        .bind(chain_id as i64)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to initialize sync state")?;

        Ok(())
    }

    /// Advance the cursor after a batch has been applied.
    pub async fn update_cursor(&self, next_block: u64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE sync_state
            SET next_block = ?,
                updated_at = ?
            WHERE id = 1
            "#,
        )
        .bind(next_block as i64)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to update sync cursor")?;

        Ok(())
    }
}
