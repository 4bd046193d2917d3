//! Storage layer for the stakedrop indexer.
//!
//! This module provides database operations for:
//! - Users (referral edges and derived counts)
//! - Stakes (locks with active/withdrawn lifecycle)
//! - Epochs (generated distributions with recipients and proofs)
//! - Reward claims (local audit of observed claims)
//! - Sync state (indexer cursor)

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub mod claim;
pub mod epoch;
pub mod stake;
pub mod sync;
pub mod types;
pub mod user;

pub use types::*;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;

/// Database storage for the indexer.
///
/// Provides async access to SQLite database with connection pooling. The API
/// process opens the same database and shares these queries.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance with the given database URL.
    ///
    /// This will create the database file if it doesn't exist. Migrations are
    /// not run; call [`Storage::run_migrations`].
    ///
    /// # Example
    /// ```no_run
    /// # use stakedrop_indexer::storage::Storage;
    /// # async fn example() -> anyhow::Result<()> {
    /// let storage = Storage::new("sqlite://stakedrop.db", None, None).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(
        database_url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        info!("Connecting to database: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .create_if_missing(true)
            .foreign_keys(true);

        let max = max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let min = min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS).min(max);

        let pool = SqlitePoolOptions::new()
            .max_connections(max)
            .min_connections(min)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        info!(max, min, "Database connection established");

        Ok(Self { pool })
    }

    /// Create a new storage instance with a specific file path.
    pub async fn new_with_path<P: AsRef<Path>>(
        path: P,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let database_url = format!("sqlite://{}", path.display());
        Self::new(&database_url, max_connections, min_connections).await
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Migrations completed successfully");

        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection");
        self.pool.close().await;
    }

    /// Get database statistics.
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        let active_stake_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM stakes WHERE status = 'active'")
                .fetch_one(&self.pool)
                .await?;

        let epoch_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM epochs")
            .fetch_one(&self.pool)
            .await?;

        let claim_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reward_claims")
            .fetch_one(&self.pool)
            .await?;

        let sync_state = self.get_sync_state().await?;

        Ok(DatabaseStats {
            user_count: user_count as u64,
            active_stake_count: active_stake_count as u64,
            epoch_count: epoch_count as u64,
            claim_count: claim_count as u64,
            next_block: sync_state.next_block,
        })
    }

    /// Check database health.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;

        Ok(())
    }
}

/// Decode an address column written in canonical form.
pub(crate) fn address_column(value: &str) -> Result<Address> {
    stakedrop_core::parse_address(value)
        .with_context(|| format!("Corrupt address column: {}", value))
}

/// Decode a uint256 column stored as decimal text.
pub(crate) fn u256_column(value: &str) -> Result<U256> {
    stakedrop_core::parse_token_amount(value)
        .with_context(|| format!("Corrupt amount column: {}", value))
}

/// Database statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Total number of known users
    pub user_count: u64,

    /// Number of active stakes
    pub active_stake_count: u64,

    /// Total number of generated epochs
    pub epoch_count: u64,

    /// Number of locally recorded claims
    pub claim_count: u64,

    /// First block not yet processed
    pub next_block: u64,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Storage;
    use tempfile::NamedTempFile;

    pub async fn setup_storage() -> (Storage, NamedTempFile) {
        let temp_db = NamedTempFile::new().unwrap();
        let storage = Storage::new_with_path(temp_db.path(), None, None)
            .await
            .unwrap();
        storage.run_migrations().await.unwrap();
        (storage, temp_db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_storage_creation() {
        let _temp_db = NamedTempFile::new().unwrap();
        let db_path = _temp_db.path();

        let storage = Storage::new_with_path(db_path, None, None).await.unwrap();
        storage.run_migrations().await.unwrap();

        storage.health_check().await.unwrap();

        storage.close().await;
    }

    #[tokio::test]
    async fn test_migrations_are_rerunnable() {
        let (storage, _temp_db) = test_support::setup_storage().await;
        storage.run_migrations().await.unwrap();
        storage.close().await;
    }

    #[tokio::test]
    async fn test_database_stats() {
        let (storage, _temp_db) = test_support::setup_storage().await;

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.user_count, 0);
        assert_eq!(stats.active_stake_count, 0);
        assert_eq!(stats.epoch_count, 0);
        assert_eq!(stats.claim_count, 0);
        assert_eq!(stats.next_block, 0);

        storage.close().await;
    }
}
