//! Row model for `pending_entries`, joined with its AI decision.

use sqlx::FromRow;
use trailpost_core::{ContentId, ContentItem, PendingEntry};

use super::ai_decision::decision_from_parts;
use super::{decode_err, from_millis, parse_column};

/// A row from `pending_entries` left-joined with `ai_decisions`.
#[derive(Debug, Clone, FromRow)]
pub struct PendingRow {
    pub content_type: String,
    pub content_id: String,
    pub id_kind: String,
    pub payload: String,
    pub author_id: String,
    pub author_name: Option<String>,
    pub status: Option<String>,
    pub moderation_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub queued_at: i64,
    pub ai_suggestion: Option<String>,
    pub ai_confidence: Option<f64>,
    pub ai_category: Option<String>,
    pub ai_issues: Option<String>,
    pub ai_reason: Option<String>,
    pub ai_analyzed_at: Option<i64>,
    pub ai_admin_verdict: Option<String>,
}

impl PendingRow {
    pub fn into_entry(self) -> Result<PendingEntry, sqlx::Error> {
        let ai_decision = match (self.ai_suggestion, self.ai_confidence, self.ai_analyzed_at) {
            (Some(suggestion), Some(confidence), Some(analyzed_at)) => Some(decision_from_parts(
                &suggestion,
                confidence,
                self.ai_category,
                self.ai_issues.as_deref().unwrap_or("[]"),
                self.ai_reason,
                analyzed_at,
                self.ai_admin_verdict.as_deref(),
            )?),
            _ => None,
        };

        let item = ContentItem {
            id: ContentId::from_parts(&self.id_kind, self.content_id).map_err(decode_err)?,
            content_type: parse_column(&self.content_type)?,
            payload: serde_json::from_str(&self.payload).map_err(decode_err)?,
            author_id: self.author_id,
            author_name: self.author_name,
            status: self.status.as_deref().map(parse_column).transpose()?,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
            moderation_reason: self.moderation_reason,
        };

        Ok(PendingEntry {
            item,
            ai_decision,
            queued_at: from_millis(self.queued_at)?,
        })
    }
}
