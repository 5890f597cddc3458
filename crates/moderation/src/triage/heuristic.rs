//! Local rule-based prescreen used when no analysis service is configured.

use async_trait::async_trait;
use regex::{Regex, RegexSet};
use trailpost_core::ai::{AiDecision, Suggestion};
use trailpost_core::ContentType;

use super::{payload_text, Classifier, TriageError};

/// Texts shorter than this (in characters) are flagged.
const MIN_TEXT_CHARS: usize = 10;

/// A run of this many identical characters is flagged.
const REPEAT_RUN: usize = 6;

/// Capital-letter ratio above which a text counts as shouting.
const MAX_CAPS_RATIO: f64 = 0.3;

/// Caps are only checked on texts longer than this.
const CAPS_MIN_CHARS: usize = 20;

/// A spam score at or above this flags the text.
const SPAM_THRESHOLD: usize = 5;

const SPAM_PHRASES: &[&str] = &[
    r"(?i)special offer",
    r"(?i)limited time",
    r"(?i)today only",
    r"(?i)call (right )?now",
    r"(?i)don'?t miss (out|this chance)",
];

const SPAM_WORDS: &[&str] = &[
    "free", "cashback", "sale", "bit.ly", "tinyurl", "goo.gl", "whatsapp", "phone number",
];

const INAPPROPRIATE_WORDS: &[&str] = &[
    "fraud", "scam", "fake", "counterfeit", "mass mailing", "extremism", "drugs",
];

const SAFE_CONFIDENCE: f64 = 0.95;
const FLAGGED_CONFIDENCE: f64 = 0.85;

/// Length, repetition, capitals, spam vocabulary and inappropriate words.
///
/// Anything flagged is suggested for review, never rejected outright.
pub struct HeuristicClassifier {
    spam_phrases: RegexSet,
    word: Regex,
}

impl HeuristicClassifier {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            spam_phrases: RegexSet::new(SPAM_PHRASES)?,
            word: Regex::new(r"[\p{L}\p{N}]+")?,
        })
    }

    /// Run every rule over `text`, returning the decision it implies.
    pub fn assess(&self, text: &str) -> AiDecision {
        let mut issues = Vec::new();
        let mut category = "safe";
        let lower = text.to_lowercase();
        let chars = text.chars().count();

        if chars < MIN_TEXT_CHARS {
            issues.push("Text is too short".to_string());
        }

        if has_repeated_run(text, REPEAT_RUN) {
            issues.push("Repeated characters".to_string());
            category = "spam";
        }

        let caps = text.chars().filter(|c| c.is_uppercase()).count();
        if chars > CAPS_MIN_CHARS && caps as f64 / chars as f64 > MAX_CAPS_RATIO {
            issues.push("Too many capital letters".to_string());
            category = "spam";
        }

        let words: Vec<&str> = self.word.find_iter(&lower).map(|m| m.as_str()).collect();
        let spam_words = SPAM_WORDS
            .iter()
            .filter(|w| contains_term(&lower, &words, w))
            .count();
        let spam_score = spam_words * 2 + self.spam_phrases.matches(text).iter().count() * 5;
        if spam_score >= SPAM_THRESHOLD {
            issues.push("Advertising detected".to_string());
            category = "spam";
        }

        let bad: Vec<&str> = INAPPROPRIATE_WORDS
            .iter()
            .copied()
            .filter(|w| contains_term(&lower, &words, w))
            .collect();
        if !bad.is_empty() {
            issues.push(format!("Inappropriate content: {}", bad.join(", ")));
            category = "inappropriate";
        }

        if issues.is_empty() {
            AiDecision::new(Suggestion::Approve, SAFE_CONFIDENCE).with_category(category)
        } else {
            let reason = issues.join("; ");
            AiDecision::new(Suggestion::Review, FLAGGED_CONFIDENCE)
                .with_category(category)
                .with_issues(issues)
                .with_reason(reason)
        }
    }
}

#[async_trait]
impl Classifier for HeuristicClassifier {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn classify(
        &self,
        _content_type: ContentType,
        payload: &serde_json::Value,
    ) -> Result<AiDecision, TriageError> {
        Ok(self.assess(&payload_text(payload)))
    }
}

fn has_repeated_run(text: &str, run: usize) -> bool {
    let mut prev = None;
    let mut len = 0;
    for c in text.chars() {
        if Some(c) == prev {
            len += 1;
        } else {
            prev = Some(c);
            len = 1;
        }
        if len >= run {
            return true;
        }
    }
    false
}

/// Single words match whole tokens; multi-word terms and domains match
/// as substrings.
fn contains_term(lower: &str, words: &[&str], term: &str) -> bool {
    if term.contains(' ') || term.contains('.') {
        lower.contains(term)
    } else {
        words.contains(&term)
    }
}
