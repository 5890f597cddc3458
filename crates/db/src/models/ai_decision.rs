//! Row model for the `ai_decisions` table.

use sqlx::FromRow;
use trailpost_core::ai::{AiDecision, Suggestion, Verdict};

use super::{decode_err, from_millis, parse_column};

/// A row from the `ai_decisions` table.
#[derive(Debug, Clone, FromRow)]
pub struct AiDecisionRow {
    pub content_type: String,
    pub content_id: String,
    pub suggestion: String,
    pub confidence: f64,
    pub category: Option<String>,
    pub issues: String,
    pub reason: Option<String>,
    pub analyzed_at: i64,
    pub admin_verdict: Option<String>,
}

impl AiDecisionRow {
    pub fn into_decision(self) -> Result<AiDecision, sqlx::Error> {
        decision_from_parts(
            &self.suggestion,
            self.confidence,
            self.category,
            &self.issues,
            self.reason,
            self.analyzed_at,
            self.admin_verdict.as_deref(),
        )
    }
}

/// Build an [`AiDecision`] from its stored columns.
///
/// Shared with the pending-entry join, which selects the same columns
/// under `ai_` aliases.
pub(crate) fn decision_from_parts(
    suggestion: &str,
    confidence: f64,
    category: Option<String>,
    issues: &str,
    reason: Option<String>,
    analyzed_at: i64,
    admin_verdict: Option<&str>,
) -> Result<AiDecision, sqlx::Error> {
    let suggestion: Suggestion = parse_column(suggestion)?;
    let issues: Vec<String> = serde_json::from_str(issues).map_err(decode_err)?;
    let admin_verdict = admin_verdict.map(parse_column::<Verdict>).transpose()?;

    let mut decision = AiDecision::new(suggestion, confidence).with_issues(issues);
    decision.category = category;
    decision.reason = reason;
    decision.analyzed_at = from_millis(analyzed_at)?;
    decision.admin_verdict = admin_verdict;
    Ok(decision)
}
