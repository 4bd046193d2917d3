//! Epoch storage operations.

use super::{u256_column, EpochRecord, EpochSummary, NewEpoch, Storage};
use alloy::primitives::B256;
use anyhow::{Context, Result};
use sqlx::Row;
use stakedrop_core::EpochKind;
use std::str::FromStr;

impl Storage {
    /// Persist a generated epoch and return its id.
    ///
    /// Each kind has its own sequence starting at 1, matching how the
    /// contract numbers standard and VIP epochs.
    pub async fn insert_epoch(&self, epoch: &NewEpoch) -> Result<u64> {
        let recipients_json =
            serde_json::to_string(&epoch.recipients).context("Failed to encode recipients")?;
        let proofs_json =
            serde_json::to_string(&epoch.proofs).context("Failed to encode proofs")?;

        // Single statement, so the MAX read and the insert cannot interleave
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO epochs (
                kind, epoch_id, merkle_root, total_amount, distributed_amount,
                recipient_count, recipients_json, proofs_json, created_at
            )
            SELECT ?, COALESCE(MAX(epoch_id), 0) + 1, ?, ?, ?, ?, ?, ?, ?
            FROM epochs
            WHERE kind = ?
            RETURNING epoch_id
            "#,
        )
        .bind(epoch.kind.as_str())
        .bind(epoch.merkle_root.to_string())
        .bind(epoch.total_amount.to_string())
        .bind(epoch.distributed_amount.to_string())
        .bind(epoch.recipients.len() as i64)
        .bind(recipients_json)
        .bind(proofs_json)
        .bind(chrono::Utc::now().timestamp())
        .bind(epoch.kind.as_str())
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert epoch")?;

        Ok(id as u64)
    }

    /// Get an epoch by kind and id.
    pub async fn get_epoch(&self, kind: EpochKind, id: u64) -> Result<Option<EpochRecord>> {
        let row = sqlx::query(
            r#"
            SELECT epoch_id, kind, merkle_root, total_amount, distributed_amount,
                   recipients_json, proofs_json, blockchain_epoch_id, created_at
            FROM epochs
            WHERE kind = ? AND epoch_id = ?
            "#,
        )
        .bind(kind.as_str())
        .bind(id as i64)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch epoch")?;

        row.map(Self::row_to_epoch_record).transpose()
    }

    /// Kinds that have an epoch with the given id.
    pub async fn epoch_kinds_with_id(&self, id: u64) -> Result<Vec<EpochKind>> {
        let kinds: Vec<String> =
            sqlx::query_scalar("SELECT kind FROM epochs WHERE epoch_id = ? ORDER BY kind")
                .bind(id as i64)
                .fetch_all(&self.pool)
                .await
                .context("Failed to look up epoch kinds")?;

        kinds
            .iter()
            .map(|kind| kind.parse().map_err(anyhow::Error::from))
            .collect()
    }

    /// Get the most recent epoch of a kind.
    pub async fn get_latest_epoch(&self, kind: EpochKind) -> Result<Option<EpochRecord>> {
        let row = sqlx::query(
            r#"
            SELECT epoch_id, kind, merkle_root, total_amount, distributed_amount,
                   recipients_json, proofs_json, blockchain_epoch_id, created_at
            FROM epochs
            WHERE kind = ?
            ORDER BY epoch_id DESC
            LIMIT 1
            "#,
        )
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch latest epoch")?;

        row.map(Self::row_to_epoch_record).transpose()
    }

    /// Summaries of all epochs of a kind, newest first.
    pub async fn list_epochs(&self, kind: EpochKind) -> Result<Vec<EpochSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT epoch_id, kind, merkle_root, total_amount, distributed_amount,
                   recipient_count, blockchain_epoch_id, created_at
            FROM epochs
            WHERE kind = ?
            ORDER BY epoch_id DESC
            "#,
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list epochs")?;

        rows.into_iter()
            .map(|row| -> Result<EpochSummary> {
                let root: String = row.get("merkle_root");
                let kind: String = row.get("kind");
                Ok(EpochSummary {
                    id: row.get::<i64, _>("epoch_id") as u64,
                    kind: kind.parse()?,
                    merkle_root: B256::from_str(&root)
                        .with_context(|| format!("Corrupt merkle_root column: {}", root))?,
                    total_amount: row.get("total_amount"),
                    distributed_amount: row.get("distributed_amount"),
                    recipient_count: row.get::<i64, _>("recipient_count") as u64,
                    blockchain_epoch_id: row
                        .get::<Option<i64>, _>("blockchain_epoch_id")
                        .map(|id| id as u64),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    /// Record the id the contract assigned at publication.
    ///
    /// Returns false when no epoch of `kind` has the given id.
    pub async fn set_blockchain_epoch_id(
        &self,
        kind: EpochKind,
        id: u64,
        blockchain_epoch_id: u64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE epochs SET blockchain_epoch_id = ? WHERE kind = ? AND epoch_id = ?",
        )
        .bind(blockchain_epoch_id as i64)
        .bind(kind.as_str())
        .bind(id as i64)
        .execute(&self.pool)
        .await
        .context("Failed to set blockchain epoch id")?;

        Ok(result.rows_affected() == 1)
    }

    /// Count total epochs.
    pub async fn count_epochs(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM epochs")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    /// Helper function to convert a database row to an EpochRecord.
    fn row_to_epoch_record(row: sqlx::sqlite::SqliteRow) -> Result<EpochRecord> {
        let kind: String = row.get("kind");
        let root: String = row.get("merkle_root");
        let total_amount: String = row.get("total_amount");
        let distributed_amount: String = row.get("distributed_amount");
        let recipients_json: String = row.get("recipients_json");
        let proofs_json: String = row.get("proofs_json");

        Ok(EpochRecord {
            id: row.get::<i64, _>("epoch_id") as u64,
            kind: kind.parse()?,
            merkle_root: B256::from_str(&root)
                .with_context(|| format!("Corrupt merkle_root column: {}", root))?,
            total_amount: u256_column(&total_amount)?,
            distributed_amount: u256_column(&distributed_amount)?,
            recipients: serde_json::from_str(&recipients_json)
                .context("Corrupt recipients_json column")?,
            proofs: serde_json::from_str(&proofs_json).context("Corrupt proofs_json column")?,
            blockchain_epoch_id: row
                .get::<Option<i64>, _>("blockchain_epoch_id")
                .map(|id| id as u64),
            created_at: row.get("created_at"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::setup_storage;
    use crate::storage::EpochRecipient;
    use alloy::primitives::U256;
    use std::collections::BTreeMap;

    fn sample_epoch(kind: EpochKind, root_byte: u8) -> NewEpoch {
        let recipient = EpochRecipient {
            address: format!("0x{}", "11".repeat(20)),
            amount: "300".to_string(),
            stake_usd_micros: 100_000_000,
            total_staked_usd_micros: 100_000_000,
            share_percent: "100.00".to_string(),
            direct_referrals: 5,
            indirect_referrals: 0,
            total_referrals: 5,
            required_referrals: Some(5),
            package_id: Some(1),
        };
        let mut proofs = BTreeMap::new();
        proofs.insert(recipient.address.clone(), vec![]);

        NewEpoch {
            kind,
            merkle_root: B256::repeat_byte(root_byte),
            total_amount: U256::from(300u64),
            distributed_amount: U256::from(300u64),
            recipients: vec![recipient],
            proofs,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_epoch() {
        let (storage, _temp_db) = setup_storage().await;

        let epoch = sample_epoch(EpochKind::Standard, 0xaa);
        let id = storage.insert_epoch(&epoch).await.unwrap();
        assert_eq!(id, 1);

        let stored = storage
            .get_epoch(EpochKind::Standard, id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.kind, EpochKind::Standard);
        assert_eq!(stored.merkle_root, epoch.merkle_root);
        assert_eq!(stored.total_amount, U256::from(300u64));
        assert_eq!(stored.recipients, epoch.recipients);
        assert_eq!(stored.proofs, epoch.proofs);
        assert_eq!(stored.blockchain_epoch_id, None);

        assert!(storage
            .get_epoch(EpochKind::Standard, id + 1)
            .await
            .unwrap()
            .is_none());
        assert!(storage
            .get_epoch(EpochKind::Vip, id)
            .await
            .unwrap()
            .is_none());

        storage.close().await;
    }

    #[tokio::test]
    async fn test_each_kind_numbers_from_one() {
        let (storage, _temp_db) = setup_storage().await;

        let first = storage
            .insert_epoch(&sample_epoch(EpochKind::Standard, 1))
            .await
            .unwrap();
        let second = storage
            .insert_epoch(&sample_epoch(EpochKind::Standard, 2))
            .await
            .unwrap();
        let vip = storage
            .insert_epoch(&sample_epoch(EpochKind::Vip, 3))
            .await
            .unwrap();
        let third = storage
            .insert_epoch(&sample_epoch(EpochKind::Standard, 4))
            .await
            .unwrap();
        assert_eq!((first, second, vip, third), (1, 2, 1, 3));

        // The first VIP epoch is VIP epoch 1 on-chain as well
        let stored_vip = storage.get_epoch(EpochKind::Vip, 1).await.unwrap().unwrap();
        assert_eq!(stored_vip.merkle_root, B256::repeat_byte(3));
        assert_eq!(stored_vip.onchain_epoch_id(), 1);

        let stored_standard = storage
            .get_epoch(EpochKind::Standard, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored_standard.merkle_root, B256::repeat_byte(1));

        assert_eq!(
            storage.epoch_kinds_with_id(1).await.unwrap(),
            vec![EpochKind::Standard, EpochKind::Vip]
        );
        assert_eq!(
            storage.epoch_kinds_with_id(3).await.unwrap(),
            vec![EpochKind::Standard]
        );
        assert!(storage.epoch_kinds_with_id(4).await.unwrap().is_empty());

        storage.close().await;
    }

    #[tokio::test]
    async fn test_latest_epoch_per_kind() {
        let (storage, _temp_db) = setup_storage().await;

        assert!(storage
            .get_latest_epoch(EpochKind::Vip)
            .await
            .unwrap()
            .is_none());

        let first = storage
            .insert_epoch(&sample_epoch(EpochKind::Standard, 1))
            .await
            .unwrap();
        storage
            .insert_epoch(&sample_epoch(EpochKind::Vip, 2))
            .await
            .unwrap();
        let second = storage
            .insert_epoch(&sample_epoch(EpochKind::Standard, 3))
            .await
            .unwrap();

        let latest = storage
            .get_latest_epoch(EpochKind::Standard)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, second);
        assert_eq!(latest.merkle_root, B256::repeat_byte(3));

        let latest_vip = storage.get_latest_epoch(EpochKind::Vip).await.unwrap().unwrap();
        assert_eq!(latest_vip.id, 1);
        assert_eq!(latest_vip.merkle_root, B256::repeat_byte(2));

        let listed = storage.list_epochs(EpochKind::Standard).await.unwrap();
        assert_eq!(
            listed.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![second, first]
        );
        assert_eq!(listed[0].recipient_count, 1);
        assert_eq!(storage.count_epochs().await.unwrap(), 3);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_set_blockchain_epoch_id() {
        let (storage, _temp_db) = setup_storage().await;

        let id = storage
            .insert_epoch(&sample_epoch(EpochKind::Standard, 1))
            .await
            .unwrap();
        storage
            .insert_epoch(&sample_epoch(EpochKind::Vip, 2))
            .await
            .unwrap();

        assert!(storage
            .set_blockchain_epoch_id(EpochKind::Standard, id, 42)
            .await
            .unwrap());
        assert!(!storage
            .set_blockchain_epoch_id(EpochKind::Standard, id + 10, 42)
            .await
            .unwrap());

        let stored = storage
            .get_epoch(EpochKind::Standard, id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.blockchain_epoch_id, Some(42));
        assert_eq!(stored.onchain_epoch_id(), 42);

        // Same id, other kind, untouched
        let vip = storage.get_epoch(EpochKind::Vip, id).await.unwrap().unwrap();
        assert_eq!(vip.blockchain_epoch_id, None);

        storage.close().await;
    }
}
