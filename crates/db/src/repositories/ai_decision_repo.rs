//! Repository for the `ai_decisions` side-channel table.
//!
//! Decisions are keyed by content type and id but are not owned by the
//! pending entry: writing one never touches `pending_entries`, so a late
//! triage result cannot resurrect an entry the moderator already removed.

use chrono::Utc;
use trailpost_core::ai::{AiDecision, Verdict};
use trailpost_core::ContentType;

use crate::models::ai_decision::AiDecisionRow;
use crate::models::{encode_err, to_millis};
use crate::DbPool;

/// Column list for `ai_decisions` queries.
const COLUMNS: &str = "content_type, content_id, suggestion, confidence, category, issues, \
                       reason, analyzed_at, admin_verdict";

/// Provides CRUD operations for advisory AI decisions.
pub struct AiDecisionRepo;

impl AiDecisionRepo {
    /// Store the current decision, replacing any earlier one.
    ///
    /// A new analysis clears an earlier human verdict, which judged a
    /// different suggestion.
    pub async fn upsert(
        pool: &DbPool,
        content_type: ContentType,
        content_id: &str,
        decision: &AiDecision,
    ) -> Result<(), sqlx::Error> {
        let issues = serde_json::to_string(&decision.issues).map_err(encode_err)?;

        sqlx::query(
            "INSERT INTO ai_decisions \
             (content_type, content_id, suggestion, confidence, category, issues, reason, \
              analyzed_at, admin_verdict, verdict_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, NULL) \
             ON CONFLICT (content_type, content_id) DO UPDATE SET \
               suggestion = excluded.suggestion, \
               confidence = excluded.confidence, \
               category = excluded.category, \
               issues = excluded.issues, \
               reason = excluded.reason, \
               analyzed_at = excluded.analyzed_at, \
               admin_verdict = NULL, \
               verdict_at = NULL",
        )
        .bind(content_type.as_str())
        .bind(content_id)
        .bind(decision.suggestion.as_str())
        .bind(decision.confidence)
        .bind(&decision.category)
        .bind(issues)
        .bind(&decision.reason)
        .bind(to_millis(decision.analyzed_at))
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Find the decision for one content item.
    pub async fn find(
        pool: &DbPool,
        content_type: ContentType,
        content_id: &str,
    ) -> Result<Option<AiDecision>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM ai_decisions WHERE content_type = ?1 AND content_id = ?2"
        );
        sqlx::query_as::<_, AiDecisionRow>(&query)
            .bind(content_type.as_str())
            .bind(content_id)
            .fetch_optional(pool)
            .await?
            .map(AiDecisionRow::into_decision)
            .transpose()
    }

    /// Record a human verdict. Returns `false` if no decision exists.
    pub async fn set_verdict(
        pool: &DbPool,
        content_type: ContentType,
        content_id: &str,
        verdict: Verdict,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE ai_decisions SET admin_verdict = ?3, verdict_at = ?4 \
             WHERE content_type = ?1 AND content_id = ?2",
        )
        .bind(content_type.as_str())
        .bind(content_id)
        .bind(verdict.as_str())
        .bind(to_millis(Utc::now()))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// The verdict column of every stored decision, for accuracy stats.
    pub async fn list_verdicts(
        pool: &DbPool,
        content_type: Option<ContentType>,
    ) -> Result<Vec<Option<String>>, sqlx::Error> {
        match content_type {
            Some(t) => {
                sqlx::query_scalar("SELECT admin_verdict FROM ai_decisions WHERE content_type = ?1")
                    .bind(t.as_str())
                    .fetch_all(pool)
                    .await
            }
            None => {
                sqlx::query_scalar("SELECT admin_verdict FROM ai_decisions")
                    .fetch_all(pool)
                    .await
            }
        }
    }
}
