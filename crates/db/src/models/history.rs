//! Row model for the append-only `moderation_history` table.

use sqlx::FromRow;
use trailpost_core::history::HistoryRecord;
use trailpost_core::ContentId;

use super::{decode_err, from_millis, parse_column};

/// A row from the `moderation_history` table.
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    pub id: i64,
    pub content_type: String,
    pub content_id: String,
    pub id_kind: String,
    pub resulting_id: Option<String>,
    pub resulting_id_kind: Option<String>,
    pub action: String,
    pub reason: Option<String>,
    pub actor_id: String,
    pub from_status: String,
    pub to_status: String,
    pub recorded_at: i64,
}

impl HistoryRow {
    pub fn into_record(self) -> Result<HistoryRecord, sqlx::Error> {
        let resulting_id = match (self.resulting_id_kind, self.resulting_id) {
            (Some(kind), Some(id)) => Some(ContentId::from_parts(&kind, id).map_err(decode_err)?),
            _ => None,
        };

        Ok(HistoryRecord {
            id: self.id,
            content_type: parse_column(&self.content_type)?,
            content_id: ContentId::from_parts(&self.id_kind, self.content_id)
                .map_err(decode_err)?,
            resulting_id,
            action: parse_column(&self.action)?,
            reason: self.reason,
            actor_id: self.actor_id,
            from_status: parse_column(&self.from_status)?,
            to_status: parse_column(&self.to_status)?,
            recorded_at: from_millis(self.recorded_at)?,
        })
    }
}
