//! Moderation notifications shown to authors.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::content::{ContentStatus, ContentType};
use crate::error::CoreError;
use crate::types::Timestamp;

/// Default retention of the local notification history.
pub const DEFAULT_RETENTION_DAYS: i64 = 60;

/// The status transition a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Approved,
    Rejected,
    Revision,
    Pending,
}

impl NotificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationStatus::Approved => "approved",
            NotificationStatus::Rejected => "rejected",
            NotificationStatus::Revision => "revision",
            NotificationStatus::Pending => "pending",
        }
    }

    /// Map a content status onto the notification vocabulary.
    ///
    /// `hidden` has no author-facing notification.
    pub fn from_content_status(status: ContentStatus) -> Option<Self> {
        match status {
            ContentStatus::Active => Some(NotificationStatus::Approved),
            ContentStatus::Rejected => Some(NotificationStatus::Rejected),
            ContentStatus::Revision => Some(NotificationStatus::Revision),
            ContentStatus::Pending => Some(NotificationStatus::Pending),
            ContentStatus::Hidden => None,
        }
    }

    /// Text used when the triggering event carries no message of its own.
    pub fn default_message(self) -> &'static str {
        match self {
            NotificationStatus::Approved => "Your content was approved and published",
            NotificationStatus::Rejected => "Your content was rejected by a moderator",
            NotificationStatus::Revision => "Your content was sent back for revision",
            NotificationStatus::Pending => "Your content was submitted for moderation",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(NotificationStatus::Approved),
            "rejected" => Ok(NotificationStatus::Rejected),
            "revision" => Ok(NotificationStatus::Revision),
            "pending" => Ok(NotificationStatus::Pending),
            other => Err(CoreError::Validation(format!(
                "Unknown notification status '{other}'"
            ))),
        }
    }
}

/// One entry of the per-recipient notification history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    /// Set when the notification came from the server feed.
    pub server_id: Option<String>,
    pub content_type: ContentType,
    pub content_id: String,
    pub content_title: Option<String>,
    pub status: NotificationStatus,
    pub reason: Option<String>,
    pub message: String,
    pub timestamp: Timestamp,
    pub read: bool,
}

impl Notification {
    pub fn new(
        content_type: ContentType,
        content_id: impl Into<String>,
        content_title: Option<String>,
        status: NotificationStatus,
        reason: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let suffix: String = rand::rng()
            .sample_iter(&rand::distr::Alphanumeric)
            .take(9)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        let message = reason
            .clone()
            .filter(|r| status == NotificationStatus::Rejected && !r.trim().is_empty())
            .unwrap_or_else(|| status.default_message().to_string());

        Self {
            id: format!("notif_{}_{suffix}", now.timestamp_millis()),
            server_id: None,
            content_type,
            content_id: content_id.into(),
            content_title,
            status,
            reason,
            message,
            timestamp: now,
            read: false,
        }
    }

    /// Idempotency key: receiving the same key twice is one notification.
    pub fn dedup_key(&self) -> (&str, NotificationStatus) {
        (&self.content_id, self.status)
    }
}
