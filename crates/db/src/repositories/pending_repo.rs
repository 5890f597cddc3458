//! Repository for the `pending_entries` table.

use trailpost_core::types::Timestamp;
use trailpost_core::{ContentType, PendingEntry};

use crate::models::encode_err;
use crate::models::pending::PendingRow;
use crate::models::to_millis;
use crate::DbPool;

/// Select list joining each entry with its advisory AI decision.
const SELECT_JOINED: &str = "SELECT p.content_type, p.content_id, p.id_kind, p.payload, \
     p.author_id, p.author_name, p.status, p.moderation_reason, \
     p.created_at, p.updated_at, p.queued_at, \
     a.suggestion AS ai_suggestion, a.confidence AS ai_confidence, \
     a.category AS ai_category, a.issues AS ai_issues, a.reason AS ai_reason, \
     a.analyzed_at AS ai_analyzed_at, a.admin_verdict AS ai_admin_verdict \
     FROM pending_entries p \
     LEFT JOIN ai_decisions a \
       ON a.content_type = p.content_type AND a.content_id = p.content_id";

/// Provides upsert/list/delete operations for pending queue entries.
pub struct PendingRepo;

impl PendingRepo {
    /// Insert or fully replace an entry, keyed by content type and id.
    ///
    /// The entry's `ai_decision` is not written here; triage owns the
    /// `ai_decisions` table.
    pub async fn upsert(pool: &DbPool, entry: &PendingEntry) -> Result<(), sqlx::Error> {
        let item = &entry.item;
        let payload = serde_json::to_string(&item.payload).map_err(encode_err)?;

        sqlx::query(
            "INSERT INTO pending_entries \
             (content_type, content_id, id_kind, payload, author_id, author_name, status, \
              moderation_reason, created_at, updated_at, queued_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
             ON CONFLICT (content_type, content_id) DO UPDATE SET \
               id_kind = excluded.id_kind, \
               payload = excluded.payload, \
               author_id = excluded.author_id, \
               author_name = excluded.author_name, \
               status = excluded.status, \
               moderation_reason = excluded.moderation_reason, \
               created_at = excluded.created_at, \
               updated_at = excluded.updated_at, \
               queued_at = excluded.queued_at",
        )
        .bind(item.content_type.as_str())
        .bind(item.id.as_str())
        .bind(item.id.kind())
        .bind(payload)
        .bind(&item.author_id)
        .bind(&item.author_name)
        .bind(item.status.map(|s| s.as_str()))
        .bind(&item.moderation_reason)
        .bind(to_millis(item.created_at))
        .bind(to_millis(item.updated_at))
        .bind(to_millis(entry.queued_at))
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Find a single entry.
    pub async fn find(
        pool: &DbPool,
        content_type: ContentType,
        content_id: &str,
    ) -> Result<Option<PendingEntry>, sqlx::Error> {
        let query = format!("{SELECT_JOINED} WHERE p.content_type = ?1 AND p.content_id = ?2");
        sqlx::query_as::<_, PendingRow>(&query)
            .bind(content_type.as_str())
            .bind(content_id)
            .fetch_optional(pool)
            .await?
            .map(PendingRow::into_entry)
            .transpose()
    }

    /// List entries, newest queued first, optionally filtered by type.
    pub async fn list(
        pool: &DbPool,
        content_type: Option<ContentType>,
    ) -> Result<Vec<PendingEntry>, sqlx::Error> {
        let rows = match content_type {
            Some(t) => {
                let query =
                    format!("{SELECT_JOINED} WHERE p.content_type = ?1 ORDER BY p.queued_at DESC");
                sqlx::query_as::<_, PendingRow>(&query)
                    .bind(t.as_str())
                    .fetch_all(pool)
                    .await?
            }
            None => {
                let query = format!("{SELECT_JOINED} ORDER BY p.queued_at DESC");
                sqlx::query_as::<_, PendingRow>(&query)
                    .fetch_all(pool)
                    .await?
            }
        };
        rows.into_iter().map(PendingRow::into_entry).collect()
    }

    /// Delete an entry. Returns `true` if a row was removed.
    pub async fn delete(
        pool: &DbPool,
        content_type: ContentType,
        content_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM pending_entries WHERE content_type = ?1 AND content_id = ?2")
                .bind(content_type.as_str())
                .bind(content_id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count entries still awaiting a decision, grouped by content type.
    ///
    /// Entries rewritten to `revision` in place are waiting on their
    /// author, not on a moderator, and are not counted.
    pub async fn count_awaiting_by_type(pool: &DbPool) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (String, i64)>(
            "SELECT content_type, COUNT(*) FROM pending_entries \
             WHERE status IS NULL OR status = 'pending' \
             GROUP BY content_type",
        )
        .fetch_all(pool)
        .await
    }

    /// Delete entries of a type queued before `cutoff`. Returns the number removed.
    pub async fn delete_queued_before(
        pool: &DbPool,
        content_type: ContentType,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM pending_entries WHERE content_type = ?1 AND queued_at < ?2")
                .bind(content_type.as_str())
                .bind(to_millis(cutoff))
                .execute(pool)
                .await?;
        Ok(result.rows_affected())
    }
}
