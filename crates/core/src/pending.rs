//! Entries of the local pending queue.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::ai::AiDecision;
use crate::content::ContentItem;
use crate::types::Timestamp;

/// A content item known only to the local pending store, or not yet
/// confirmed by the authoritative one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub item: ContentItem,
    /// Advisory triage result, if analysis has completed.
    pub ai_decision: Option<AiDecision>,
    /// When the entry was queued; drives stale eviction.
    pub queued_at: Timestamp,
}

impl PendingEntry {
    pub fn new(item: ContentItem) -> Self {
        Self {
            item,
            ai_decision: None,
            queued_at: Utc::now(),
        }
    }

    pub fn is_older_than(&self, max_age: chrono::Duration, now: Timestamp) -> bool {
        now - self.queued_at > max_age
    }
}
