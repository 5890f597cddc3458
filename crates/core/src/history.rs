//! Append-only moderation history records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::content::{ContentId, ContentStatus, ContentType};
use crate::error::CoreError;
use crate::types::Timestamp;

/// A human moderation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    Approve,
    Reject,
    RequestRevision,
    Hide,
    Resubmit,
}

impl ModerationAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ModerationAction::Approve => "approve",
            ModerationAction::Reject => "reject",
            ModerationAction::RequestRevision => "request_revision",
            ModerationAction::Hide => "hide",
            ModerationAction::Resubmit => "resubmit",
        }
    }
}

impl fmt::Display for ModerationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModerationAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(ModerationAction::Approve),
            "reject" => Ok(ModerationAction::Reject),
            "request_revision" => Ok(ModerationAction::RequestRevision),
            "hide" => Ok(ModerationAction::Hide),
            "resubmit" => Ok(ModerationAction::Resubmit),
            other => Err(CoreError::Validation(format!(
                "Unknown moderation action '{other}'"
            ))),
        }
    }
}

/// A record to append to the moderation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHistoryRecord {
    pub content_type: ContentType,
    /// Id the action was applied to.
    pub content_id: ContentId,
    /// Id the content ended up with, when it changed (create-from-local,
    /// resubmission).
    pub resulting_id: Option<ContentId>,
    pub action: ModerationAction,
    pub reason: Option<String>,
    pub actor_id: String,
    pub from_status: ContentStatus,
    pub to_status: ContentStatus,
}

/// A stored history record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub content_type: ContentType,
    pub content_id: ContentId,
    pub resulting_id: Option<ContentId>,
    pub action: ModerationAction,
    pub reason: Option<String>,
    pub actor_id: String,
    pub from_status: ContentStatus,
    pub to_status: ContentStatus,
    pub recorded_at: Timestamp,
}

/// Filter for history listings. All fields are optional.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub content_type: Option<ContentType>,
    pub action: Option<ModerationAction>,
    pub content_id: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl HistoryFilter {
    /// Default page size for history listings.
    pub const DEFAULT_LIMIT: i64 = 50;

    pub fn new() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            ..Default::default()
        }
    }
}
