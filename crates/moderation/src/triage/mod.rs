//! Advisory AI triage.
//!
//! A [`Classifier`] produces an [`AiDecision`] for a payload. The
//! [`TriageClient`] runs it off the creation path and stores the result
//! in the side-channel `ai_decisions` table. Nothing here ever changes a
//! content status.

mod heuristic;
mod http;

pub use heuristic::HeuristicClassifier;
pub use http::HttpClassifier;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use trailpost_core::ai::{AccuracyStats, AiDecision, Verdict};
use trailpost_core::{ContentId, ContentType};
use trailpost_db::repositories::AiDecisionRepo;
use trailpost_db::DbPool;

/// Payload keys whose text is analysed, in order.
const TEXT_KEYS: &[&str] = &["title", "name", "body", "text", "description", "content"];

#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("Analysis request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Analysis service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unreadable analysis response: {0}")]
    Decode(String),

    #[error("Failed to store analysis: {0}")]
    Store(#[from] sqlx::Error),
}

/// Something that can suggest a moderation outcome.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn classify(
        &self,
        content_type: ContentType,
        payload: &serde_json::Value,
    ) -> Result<AiDecision, TriageError>;
}

/// Concatenate the textual fields of a payload for analysis.
pub(crate) fn payload_text(payload: &serde_json::Value) -> String {
    TEXT_KEYS
        .iter()
        .filter_map(|k| payload.get(*k).and_then(|v| v.as_str()))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Runs a classifier and records its decisions.
#[derive(Clone)]
pub struct TriageClient {
    pool: DbPool,
    classifier: Arc<dyn Classifier>,
}

impl TriageClient {
    pub fn new(pool: DbPool, classifier: Arc<dyn Classifier>) -> Self {
        Self { pool, classifier }
    }

    /// Analyse in the background. The returned handle may be dropped;
    /// failures are logged and the item simply has no decision.
    pub fn analyze(
        &self,
        content_type: ContentType,
        id: ContentId,
        payload: serde_json::Value,
    ) -> JoinHandle<Option<AiDecision>> {
        let client = self.clone();
        tokio::spawn(async move {
            match client.analyze_now(content_type, &id, &payload).await {
                Ok(decision) => Some(decision),
                Err(e) => {
                    tracing::warn!(
                        content_type = %content_type,
                        content_id = %id,
                        classifier = client.classifier.name(),
                        error = %e,
                        "AI analysis failed, continuing without a recommendation",
                    );
                    None
                }
            }
        })
    }

    /// Analyse and store the decision, returning it.
    pub async fn analyze_now(
        &self,
        content_type: ContentType,
        id: &ContentId,
        payload: &serde_json::Value,
    ) -> Result<AiDecision, TriageError> {
        let decision = self.classifier.classify(content_type, payload).await?;
        AiDecisionRepo::upsert(&self.pool, content_type, id.as_str(), &decision).await?;
        tracing::debug!(
            content_type = %content_type,
            content_id = %id,
            suggestion = %decision.suggestion,
            confidence = decision.confidence,
            "AI decision recorded",
        );
        Ok(decision)
    }

    /// Record a moderator's judgement of the current decision.
    ///
    /// Returns `false` when the item has no decision.
    pub async fn record_verdict(
        &self,
        content_type: ContentType,
        id: &ContentId,
        verdict: Verdict,
    ) -> Result<bool, sqlx::Error> {
        AiDecisionRepo::set_verdict(&self.pool, content_type, id.as_str(), verdict).await
    }

    pub async fn decision(
        &self,
        content_type: ContentType,
        id: &ContentId,
    ) -> Result<Option<AiDecision>, sqlx::Error> {
        AiDecisionRepo::find(&self.pool, content_type, id.as_str()).await
    }

    pub async fn accuracy_stats(
        &self,
        content_type: Option<ContentType>,
    ) -> Result<AccuracyStats, sqlx::Error> {
        let verdicts = AiDecisionRepo::list_verdicts(&self.pool, content_type).await?;
        Ok(AccuracyStats::from_verdicts(verdicts.into_iter().map(
            |raw| match raw.map(|v| v.parse::<Verdict>()) {
                Some(Ok(v)) => Some(v),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Ignoring unknown stored verdict");
                    None
                }
                None => None,
            },
        )))
    }
}
