//! User and referral-edge storage operations.

use super::{
    address_column, ReferralCounts, ReferrerUpdate, StakerSnapshot, Storage, UserRecord,
};
use alloy::primitives::Address;
use anyhow::{Context, Result};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use stakedrop_core::{canonical_address, referral_code, Package};

/// Insert a user row if missing. Returns true when a row was created.
pub(crate) async fn ensure_user_on(
    conn: &mut SqliteConnection,
    address: &Address,
    now: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (address, referral_code, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(address) DO NOTHING
        "#,
    )
    .bind(canonical_address(address))
    .bind(referral_code(address))
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .context("Failed to ensure user")?;

    Ok(result.rows_affected() == 1)
}

impl Storage {
    /// Insert a user row if missing. Returns true when a row was created.
    pub async fn ensure_user(&self, address: &Address) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        ensure_user_on(&mut conn, address, chrono::Utc::now().timestamp()).await
    }

    /// Get a user by address.
    pub async fn get_user(&self, address: &Address) -> Result<Option<UserRecord>> {
        let row = sqlx::query(
            r#"
            SELECT address, referral_code, referrer_address,
                   direct_referrals_count, indirect_referrals_count,
                   total_referrals_count, total_staked_usd,
                   created_at, updated_at
            FROM users
            WHERE address = ?
            "#,
        )
        .bind(canonical_address(address))
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user")?;

        row.map(Self::row_to_user_record).transpose()
    }

    /// Record `referrer` as the referrer of `user`.
    ///
    /// The edge is written only when the user has none yet; both users are
    /// created if missing. An existing edge is reported as unchanged when it
    /// already points at `referrer`, and as a conflict otherwise.
    pub async fn set_referrer(&self, user: &Address, referrer: &Address) -> Result<ReferrerUpdate> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        ensure_user_on(&mut tx, user, now).await?;
        ensure_user_on(&mut tx, referrer, now).await?;

        let result = sqlx::query(
            r#"
            UPDATE users
            SET referrer_address = ?, updated_at = ?
            WHERE address = ? AND referrer_address IS NULL
            "#,
        )
        .bind(canonical_address(referrer))
        .bind(now)
        .bind(canonical_address(user))
        .execute(&mut *tx)
        .await
        .context("Failed to set referrer")?;

        let update = if result.rows_affected() == 1 {
            ReferrerUpdate::Set
        } else {
            let existing: String =
                sqlx::query_scalar("SELECT referrer_address FROM users WHERE address = ?")
                    .bind(canonical_address(user))
                    .fetch_one(&mut *tx)
                    .await
                    .context("Failed to fetch existing referrer")?;
            let existing = address_column(&existing)?;

            if existing == *referrer {
                ReferrerUpdate::Unchanged
            } else {
                ReferrerUpdate::Conflict(existing)
            }
        };

        tx.commit().await?;

        Ok(update)
    }

    /// Get the referrer of a user, if any.
    pub async fn get_referrer(&self, user: &Address) -> Result<Option<Address>> {
        let referrer: Option<Option<String>> =
            sqlx::query_scalar("SELECT referrer_address FROM users WHERE address = ?")
                .bind(canonical_address(user))
                .fetch_optional(&self.pool)
                .await
                .context("Failed to fetch referrer")?;

        referrer
            .flatten()
            .map(|value| address_column(&value))
            .transpose()
    }

    /// Users directly referred by any of `parents`, as `(child, parent)` pairs.
    pub async fn children_of(&self, parents: &[Address]) -> Result<Vec<(Address, Address)>> {
        if parents.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT address, referrer_address FROM users WHERE referrer_address IN (");
        let mut separated = builder.separated(", ");
        for parent in parents {
            separated.push_bind(canonical_address(parent));
        }
        separated.push_unseparated(") ORDER BY address");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch referral children")?;

        rows.into_iter()
            .map(|row| -> Result<(Address, Address)> {
                let child: String = row.get("address");
                let parent: String = row.get("referrer_address");
                Ok((address_column(&child)?, address_column(&parent)?))
            })
            .collect()
    }

    /// Every referral edge as `(user, referrer)`.
    pub async fn get_all_referral_edges(&self) -> Result<Vec<(Address, Address)>> {
        let rows = sqlx::query(
            r#"
            SELECT address, referrer_address
            FROM users
            WHERE referrer_address IS NOT NULL
            ORDER BY address
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch referral edges")?;

        rows.into_iter()
            .map(|row| -> Result<(Address, Address)> {
                let user: String = row.get("address");
                let referrer: String = row.get("referrer_address");
                Ok((address_column(&user)?, address_column(&referrer)?))
            })
            .collect()
    }

    /// Every known user address.
    pub async fn get_all_user_addresses(&self) -> Result<Vec<Address>> {
        let rows: Vec<String> = sqlx::query_scalar("SELECT address FROM users ORDER BY address")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch user addresses")?;

        rows.iter().map(|value| address_column(value)).collect()
    }

    /// Overwrite the referral aggregates of one user.
    pub async fn update_referral_counts(
        &self,
        user: &Address,
        counts: ReferralCounts,
    ) -> Result<()> {
        self.update_referral_counts_batch(&[(*user, counts)])
            .await
            .map(|_| ())
    }

    /// Overwrite the referral aggregates of many users in one transaction.
    pub async fn update_referral_counts_batch(
        &self,
        updates: &[(Address, ReferralCounts)],
    ) -> Result<u64> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;

        for (user, counts) in updates {
            let result = sqlx::query(
                r#"
                UPDATE users
                SET direct_referrals_count = ?,
                    indirect_referrals_count = ?,
                    total_referrals_count = ?,
                    updated_at = ?
                WHERE address = ?
                "#,
            )
            .bind(counts.direct as i64)
            .bind(counts.indirect as i64)
            .bind(counts.total() as i64)
            .bind(now)
            .bind(canonical_address(user))
            .execute(&mut *tx)
            .await
            .context("Failed to update referral counts")?;

            updated += result.rows_affected();
        }

        tx.commit().await?;

        Ok(updated)
    }

    /// Users with at least one active stake, with their aggregates.
    ///
    /// Ordered by address so that epoch generation sees a stable snapshot.
    pub async fn get_stakers_with_active_stake(&self) -> Result<Vec<StakerSnapshot>> {
        let rows = sqlx::query(
            r#"
            SELECT u.address AS address,
                   u.total_staked_usd AS total_staked_usd,
                   u.direct_referrals_count AS direct_referrals_count,
                   u.indirect_referrals_count AS indirect_referrals_count,
                   SUM(s.amount_usd) AS active_stake_usd,
                   COUNT(s.lock_id) AS active_stakes,
                   MAX(s.package_id) AS top_package
            FROM users u
            JOIN stakes s ON s.user_address = u.address AND s.status = 'active'
            GROUP BY u.address
            ORDER BY u.address
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch active stakers")?;

        rows.into_iter()
            .map(|row| -> Result<StakerSnapshot> {
                let address: String = row.get("address");
                let top_package = row
                    .get::<Option<i64>, _>("top_package")
                    .map(|id| Package::from_id(id as u8))
                    .transpose()?;

                Ok(StakerSnapshot {
                    address: address_column(&address)?,
                    active_stake_usd: row.get::<i64, _>("active_stake_usd") as u64,
                    total_staked_usd: row.get::<i64, _>("total_staked_usd") as u64,
                    active_stakes: row.get::<i64, _>("active_stakes") as u64,
                    top_package,
                    referrals: ReferralCounts {
                        direct: row.get::<i64, _>("direct_referrals_count") as u64,
                        indirect: row.get::<i64, _>("indirect_referrals_count") as u64,
                    },
                })
            })
            .collect()
    }

    /// Helper function to convert a database row to a UserRecord.
    fn row_to_user_record(row: sqlx::sqlite::SqliteRow) -> Result<UserRecord> {
        let address: String = row.get("address");
        let referrer: Option<String> = row.get("referrer_address");

        Ok(UserRecord {
            address: address_column(&address)?,
            referral_code: row.get("referral_code"),
            referrer: referrer.as_deref().map(address_column).transpose()?,
            direct_referrals: row.get::<i64, _>("direct_referrals_count") as u64,
            indirect_referrals: row.get::<i64, _>("indirect_referrals_count") as u64,
            total_referrals: row.get::<i64, _>("total_referrals_count") as u64,
            total_staked_usd: row.get::<i64, _>("total_staked_usd") as u64,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::setup_storage;

    fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    #[tokio::test]
    async fn test_ensure_user_is_idempotent() {
        let (storage, _temp_db) = setup_storage().await;

        assert!(storage.ensure_user(&addr(1)).await.unwrap());
        assert!(!storage.ensure_user(&addr(1)).await.unwrap());

        let user = storage.get_user(&addr(1)).await.unwrap().unwrap();
        assert_eq!(user.address, addr(1));
        assert_eq!(user.referral_code, referral_code(&addr(1)));
        assert_eq!(user.referrer, None);
        assert_eq!(user.total_referrals, 0);

        assert!(storage.get_user(&addr(2)).await.unwrap().is_none());

        storage.close().await;
    }

    #[tokio::test]
    async fn test_referrer_is_set_once() {
        let (storage, _temp_db) = setup_storage().await;

        assert_eq!(
            storage.set_referrer(&addr(2), &addr(1)).await.unwrap(),
            ReferrerUpdate::Set
        );
        // Same edge again is reported as unchanged
        assert_eq!(
            storage.set_referrer(&addr(2), &addr(1)).await.unwrap(),
            ReferrerUpdate::Unchanged
        );
        // A second referrer never replaces the first
        assert_eq!(
            storage.set_referrer(&addr(2), &addr(3)).await.unwrap(),
            ReferrerUpdate::Conflict(addr(1))
        );

        assert_eq!(storage.get_referrer(&addr(2)).await.unwrap(), Some(addr(1)));
        assert_eq!(storage.get_referrer(&addr(1)).await.unwrap(), None);
        // The referrer was created on the fly
        assert!(storage.get_user(&addr(1)).await.unwrap().is_some());

        storage.close().await;
    }

    #[tokio::test]
    async fn test_children_and_edges() {
        let (storage, _temp_db) = setup_storage().await;

        storage.set_referrer(&addr(2), &addr(1)).await.unwrap();
        storage.set_referrer(&addr(3), &addr(1)).await.unwrap();
        storage.set_referrer(&addr(4), &addr(2)).await.unwrap();

        let children = storage.children_of(&[addr(1)]).await.unwrap();
        assert_eq!(children, vec![(addr(2), addr(1)), (addr(3), addr(1))]);

        let children = storage.children_of(&[addr(2), addr(3)]).await.unwrap();
        assert_eq!(children, vec![(addr(4), addr(2))]);

        assert!(storage.children_of(&[]).await.unwrap().is_empty());

        let edges = storage.get_all_referral_edges().await.unwrap();
        assert_eq!(edges.len(), 3);

        assert_eq!(storage.get_all_user_addresses().await.unwrap().len(), 4);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_update_referral_counts() {
        let (storage, _temp_db) = setup_storage().await;
        storage.ensure_user(&addr(1)).await.unwrap();

        storage
            .update_referral_counts(
                &addr(1),
                ReferralCounts {
                    direct: 3,
                    indirect: 4,
                },
            )
            .await
            .unwrap();

        let user = storage.get_user(&addr(1)).await.unwrap().unwrap();
        assert_eq!(user.direct_referrals, 3);
        assert_eq!(user.indirect_referrals, 4);
        assert_eq!(user.total_referrals, 7);

        // Unknown users are not created by count updates
        let updated = storage
            .update_referral_counts_batch(&[(addr(9), ReferralCounts::default())])
            .await
            .unwrap();
        assert_eq!(updated, 0);

        storage.close().await;
    }
}
