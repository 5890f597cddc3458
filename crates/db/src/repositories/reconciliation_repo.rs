//! Repository for `reconciled_ids`: local ids that now have a persisted
//! counterpart in the authoritative store.

use chrono::Utc;
use trailpost_core::{ContentItem, ContentType};

use crate::models::{decode_err, encode_err, to_millis};
use crate::DbPool;

/// Provides the local-to-remote id map.
pub struct ReconciliationRepo;

impl ReconciliationRepo {
    /// Record that `local_id` was persisted as `record` and drop its
    /// pending entry, in one transaction.
    ///
    /// The first mapping for a local id wins; a repeated call keeps the
    /// original record.
    pub async fn reconcile(
        pool: &DbPool,
        content_type: ContentType,
        local_id: &str,
        record: &ContentItem,
    ) -> Result<(), sqlx::Error> {
        let json = serde_json::to_string(record).map_err(encode_err)?;
        let mut tx = pool.begin().await?;

        sqlx::query(
            "INSERT INTO reconciled_ids (content_type, local_id, remote_id, record, reconciled_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT (content_type, local_id) DO NOTHING",
        )
        .bind(content_type.as_str())
        .bind(local_id)
        .bind(record.id.as_str())
        .bind(json)
        .bind(to_millis(Utc::now()))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM pending_entries WHERE content_type = ?1 AND content_id = ?2")
            .bind(content_type.as_str())
            .bind(local_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await
    }

    /// Look up the persisted record a local id was reconciled into.
    pub async fn find(
        pool: &DbPool,
        content_type: ContentType,
        local_id: &str,
    ) -> Result<Option<ContentItem>, sqlx::Error> {
        let json: Option<String> = sqlx::query_scalar(
            "SELECT record FROM reconciled_ids WHERE content_type = ?1 AND local_id = ?2",
        )
        .bind(content_type.as_str())
        .bind(local_id)
        .fetch_optional(pool)
        .await?;

        json.map(|j| serde_json::from_str(&j).map_err(decode_err))
            .transpose()
    }
}
