//! Client for an external AI analysis service.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use trailpost_core::ai::{AiDecision, Suggestion};
use trailpost_core::ContentType;

use super::{payload_text, Classifier, TriageError};

/// Analysis is advisory; give up quickly rather than hold a task open.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    content_type: &'a str,
    text: String,
    content: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    #[serde(alias = "action")]
    suggestion: String,
    confidence: f64,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// POSTs content to `{url}` and reads back a suggestion.
pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
}

impl HttpClassifier {
    pub fn new(url: impl Into<String>) -> Result<Self, TriageError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn classify(
        &self,
        content_type: ContentType,
        payload: &serde_json::Value,
    ) -> Result<AiDecision, TriageError> {
        let body = AnalyzeRequest {
            content_type: content_type.as_str(),
            text: payload_text(payload),
            content: payload,
        };

        let resp = self.client.post(&self.url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TriageError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: AnalyzeResponse = resp.json().await?;
        let suggestion: Suggestion = parsed
            .suggestion
            .parse()
            .map_err(|e: trailpost_core::CoreError| TriageError::Decode(e.to_string()))?;

        let mut decision = AiDecision::new(suggestion, parsed.confidence).with_issues(parsed.issues);
        decision.category = parsed.category;
        decision.reason = parsed.reason;
        Ok(decision)
    }
}
