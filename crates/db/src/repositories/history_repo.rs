//! Repository for the append-only `moderation_history` table.
//!
//! There is no update or delete method; the table's
//! triggers reject both.

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};
use trailpost_core::history::{HistoryFilter, HistoryRecord, NewHistoryRecord};

use crate::models::history::HistoryRow;
use crate::models::to_millis;
use crate::DbPool;

/// Column list for `moderation_history` queries.
const COLUMNS: &str = "id, content_type, content_id, id_kind, resulting_id, resulting_id_kind, \
                       action, reason, actor_id, from_status, to_status, recorded_at";

/// Provides append and query operations for moderation history.
pub struct HistoryRepo;

impl HistoryRepo {
    /// Append a record, returning its generated id.
    pub async fn append(pool: &DbPool, record: &NewHistoryRecord) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO moderation_history \
             (content_type, content_id, id_kind, resulting_id, resulting_id_kind, action, \
              reason, actor_id, from_status, to_status, recorded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
             RETURNING id",
        )
        .bind(record.content_type.as_str())
        .bind(record.content_id.as_str())
        .bind(record.content_id.kind())
        .bind(record.resulting_id.as_ref().map(|id| id.as_str()))
        .bind(record.resulting_id.as_ref().map(|id| id.kind()))
        .bind(record.action.as_str())
        .bind(&record.reason)
        .bind(&record.actor_id)
        .bind(record.from_status.as_str())
        .bind(record.to_status.as_str())
        .bind(to_millis(Utc::now()))
        .fetch_one(pool)
        .await
    }

    /// List records matching `filter`, newest first.
    ///
    /// `content_id` matches either the id acted on or the resulting id,
    /// so the trail of a local draft continues under its server id.
    pub async fn list(
        pool: &DbPool,
        filter: &HistoryFilter,
    ) -> Result<Vec<HistoryRecord>, sqlx::Error> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {COLUMNS} FROM moderation_history WHERE 1 = 1"));

        if let Some(t) = filter.content_type {
            qb.push(" AND content_type = ").push_bind(t.as_str());
        }
        if let Some(a) = filter.action {
            qb.push(" AND action = ").push_bind(a.as_str());
        }
        if let Some(id) = &filter.content_id {
            qb.push(" AND (content_id = ")
                .push_bind(id.clone())
                .push(" OR resulting_id = ")
                .push_bind(id.clone())
                .push(")");
        }
        qb.push(" ORDER BY id DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let rows: Vec<HistoryRow> = qb.build_query_as().fetch_all(pool).await?;
        rows.into_iter().map(HistoryRow::into_record).collect()
    }
}
