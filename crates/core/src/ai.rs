//! Advisory AI triage annotations.
//!
//! An [`AiDecision`] informs a moderator but never changes a content
//! status by itself. A human may later record a [`Verdict`] on it, which
//! feeds [`AccuracyStats`].

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

/// What the classifier recommends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Suggestion {
    Approve,
    Reject,
    Hide,
    Review,
}

impl Suggestion {
    pub fn as_str(self) -> &'static str {
        match self {
            Suggestion::Approve => "approve",
            Suggestion::Reject => "reject",
            Suggestion::Hide => "hide",
            Suggestion::Review => "review",
        }
    }
}

impl FromStr for Suggestion {
    type Err = CoreError;

    /// `block` is an alias some classifiers emit for `reject`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Suggestion::Approve),
            "reject" | "block" => Ok(Suggestion::Reject),
            "hide" => Ok(Suggestion::Hide),
            "review" => Ok(Suggestion::Review),
            other => Err(CoreError::Validation(format!(
                "Unknown AI suggestion '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Suggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A moderator's after-the-fact judgement of an AI suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Correct,
    Incorrect,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Correct => "correct",
            Verdict::Incorrect => "incorrect",
        }
    }
}

impl FromStr for Verdict {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "correct" => Ok(Verdict::Correct),
            "incorrect" => Ok(Verdict::Incorrect),
            other => Err(CoreError::Validation(format!(
                "Verdict must be 'correct' or 'incorrect', got '{other}'"
            ))),
        }
    }
}

/// Clamp a raw confidence into `[0, 1]`. Non-finite values become `0`.
pub fn clamp_confidence(raw: f64) -> f64 {
    if raw.is_finite() {
        raw.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// The current advisory decision for one content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiDecision {
    pub suggestion: Suggestion,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    /// Free-form classifier category; display only.
    pub category: Option<String>,
    pub issues: Vec<String>,
    pub reason: Option<String>,
    pub analyzed_at: Timestamp,
    pub admin_verdict: Option<Verdict>,
}

impl AiDecision {
    pub fn new(suggestion: Suggestion, confidence: f64) -> Self {
        Self {
            suggestion,
            confidence: clamp_confidence(confidence),
            category: None,
            issues: Vec::new(),
            reason: None,
            analyzed_at: Utc::now(),
            admin_verdict: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_issues(mut self, issues: Vec<String>) -> Self {
        self.issues = issues;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Confidence as a whole percentage, for display.
    pub fn confidence_percent(&self) -> u8 {
        (self.confidence * 100.0).round() as u8
    }
}

/// Aggregated verdict counts over a set of AI decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccuracyStats {
    pub correct: u64,
    pub incorrect: u64,
    pub unverified: u64,
}

impl AccuracyStats {
    pub fn from_verdicts<I>(verdicts: I) -> Self
    where
        I: IntoIterator<Item = Option<Verdict>>,
    {
        verdicts
            .into_iter()
            .fold(Self::default(), |mut acc, verdict| {
                match verdict {
                    Some(Verdict::Correct) => acc.correct += 1,
                    Some(Verdict::Incorrect) => acc.incorrect += 1,
                    None => acc.unverified += 1,
                }
                acc
            })
    }

    /// Share of verified decisions judged correct; `None` when nothing is verified.
    pub fn accuracy(&self) -> Option<f64> {
        let verified = self.correct + self.incorrect;
        (verified > 0).then(|| self.correct as f64 / verified as f64)
    }
}
