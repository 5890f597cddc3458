//! Append-only moderation audit trail.

use trailpost_core::history::{HistoryFilter, HistoryRecord, NewHistoryRecord};
use trailpost_db::repositories::HistoryRepo;
use trailpost_db::DbPool;

/// Read and append access to the moderation history.
#[derive(Clone)]
pub struct ModerationLog {
    pool: DbPool,
}

impl ModerationLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, record: &NewHistoryRecord) -> Result<i64, sqlx::Error> {
        let id = HistoryRepo::append(&self.pool, record).await?;
        tracing::debug!(
            history_id = id,
            action = %record.action,
            content_id = %record.content_id,
            "Moderation history appended",
        );
        Ok(id)
    }

    /// Records matching `filter`, newest first.
    pub async fn list(&self, filter: &HistoryFilter) -> Result<Vec<HistoryRecord>, sqlx::Error> {
        HistoryRepo::list(&self.pool, filter).await
    }
}
