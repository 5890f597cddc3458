//! Content identity, lifecycle and the generic moderatable envelope.
//!
//! A [`ContentItem`] wraps any user-generated entity (post, marker,
//! event, route, comment). Its [`ContentId`] is tagged once at creation
//! as either local-only or server-assigned, and its [`ContentStatus`]
//! moves through a closed transition table enforced by
//! [`validate_transition`].

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// ContentType
// ---------------------------------------------------------------------------

/// The kind of moderatable entity. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Post,
    Marker,
    Event,
    Route,
    Comment,
}

impl ContentType {
    /// Every content type, in badge display order.
    pub const ALL: [ContentType; 5] = [
        ContentType::Post,
        ContentType::Marker,
        ContentType::Event,
        ContentType::Route,
        ContentType::Comment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Post => "post",
            ContentType::Marker => "marker",
            ContentType::Event => "event",
            ContentType::Route => "route",
            ContentType::Comment => "comment",
        }
    }

    /// Plural collection name used in remote URL paths (`/posts`, `/moderation/posts/...`).
    pub fn collection(self) -> &'static str {
        match self {
            ContentType::Post => "posts",
            ContentType::Marker => "markers",
            ContentType::Event => "events",
            ContentType::Route => "routes",
            ContentType::Comment => "comments",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = CoreError;

    /// Accepts both the singular and the plural collection spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentType::ALL
            .into_iter()
            .find(|t| t.as_str() == s || t.collection() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown content type '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// ContentStatus
// ---------------------------------------------------------------------------

/// Moderation status. A content item holds exactly one of these at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Pending,
    Active,
    Rejected,
    Revision,
    Hidden,
}

impl ContentStatus {
    pub const ALL: [ContentStatus; 5] = [
        ContentStatus::Pending,
        ContentStatus::Active,
        ContentStatus::Rejected,
        ContentStatus::Revision,
        ContentStatus::Hidden,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContentStatus::Pending => "pending",
            ContentStatus::Active => "active",
            ContentStatus::Rejected => "rejected",
            ContentStatus::Revision => "revision",
            ContentStatus::Hidden => "hidden",
        }
    }

    /// Returns the set of statuses that `self` may transition to.
    ///
    /// Transition rules:
    /// - `pending`  -> `active`, `rejected`, `revision`
    /// - `active`   -> `hidden`
    /// - `revision` -> `pending` (resubmission as a fresh entry)
    /// - `rejected`, `hidden` -> nothing
    pub fn valid_transitions(self) -> &'static [ContentStatus] {
        match self {
            ContentStatus::Pending => &[
                ContentStatus::Active,
                ContentStatus::Rejected,
                ContentStatus::Revision,
            ],
            ContentStatus::Active => &[ContentStatus::Hidden],
            ContentStatus::Revision => &[ContentStatus::Pending],
            ContentStatus::Rejected | ContentStatus::Hidden => &[],
        }
    }

    /// `active` and `rejected` are final until a new submission.
    pub fn is_terminal_for_now(self) -> bool {
        matches!(self, ContentStatus::Active | ContentStatus::Rejected)
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown content status '{s}'")))
    }
}

/// Validate that a status transition from `from` to `to` is allowed.
pub fn validate_transition(from: ContentStatus, to: ContentStatus) -> Result<(), CoreError> {
    if from.valid_transitions().contains(&to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition { from, to })
    }
}

// ---------------------------------------------------------------------------
// ContentId
// ---------------------------------------------------------------------------

/// Prefix of every locally generated id.
pub const LOCAL_ID_PREFIX: &str = "pending_";

/// Prefixes that older clients used for local-only records.
const LEGACY_LOCAL_PREFIXES: &[&str] = &[LOCAL_ID_PREFIX, "post:", "marker:", "event:", "route:"];

/// Length of the random suffix of a generated local id.
const LOCAL_ID_SUFFIX_LEN: usize = 7;

/// Identity of a content item, tagged at creation.
///
/// `Local` ids exist only in the pending store; `Remote` ids were
/// assigned by the authoritative store. The tag is carried through
/// serialization and never re-derived from the string shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ContentId {
    Local(String),
    Remote(String),
}

impl ContentId {
    /// Generate a fresh local id: `pending_<unix-seconds>_<7 chars>`.
    pub fn new_local() -> Self {
        Self::new_local_at(Utc::now())
    }

    pub fn new_local_at(now: Timestamp) -> Self {
        let suffix: String = rand::rng()
            .sample_iter(&rand::distr::Alphanumeric)
            .take(LOCAL_ID_SUFFIX_LEN)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        ContentId::Local(format!("{LOCAL_ID_PREFIX}{}_{suffix}", now.timestamp()))
    }

    pub fn remote(id: impl Into<String>) -> Self {
        ContentId::Remote(id.into())
    }

    /// Tag an untagged id string coming from a legacy record.
    ///
    /// Only for importing data written before ids were tagged; new code
    /// must keep the tag it was created with.
    pub fn classify(raw: &str) -> Self {
        if LEGACY_LOCAL_PREFIXES.iter().any(|p| raw.starts_with(p)) {
            ContentId::Local(raw.to_string())
        } else {
            ContentId::Remote(raw.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ContentId::Local(id) | ContentId::Remote(id) => id,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ContentId::Local(_))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ContentId::Remote(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ContentId::Local(_) => "local",
            ContentId::Remote(_) => "remote",
        }
    }

    /// Rebuild a tagged id from its stored `kind` and value.
    pub fn from_parts(kind: &str, value: impl Into<String>) -> Result<Self, CoreError> {
        match kind {
            "local" => Ok(ContentId::Local(value.into())),
            "remote" => Ok(ContentId::Remote(value.into())),
            other => Err(CoreError::Validation(format!("Unknown id kind '{other}'"))),
        }
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ContentItem
// ---------------------------------------------------------------------------

/// Payload keys tried, in order, when deriving a display title.
const TITLE_KEYS: &[&str] = &["title", "name"];

/// Payload keys tried, in order, when deriving a text excerpt.
const BODY_KEYS: &[&str] = &["body", "text", "description", "content"];

/// Maximum characters of body text used as a fallback title.
pub const TITLE_EXCERPT_CHARS: usize = 60;

/// Generic envelope around any moderatable entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,
    pub content_type: ContentType,
    /// Type-specific fields; opaque to the engine apart from titles.
    pub payload: serde_json::Value,
    pub author_id: String,
    pub author_name: Option<String>,
    /// `None` only for local drafts that were never confirmed; such
    /// items are implicitly pending.
    pub status: Option<ContentStatus>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub moderation_reason: Option<String>,
}

impl ContentItem {
    /// A new local draft with a fresh local id and no explicit status.
    pub fn new_local(
        content_type: ContentType,
        author_id: impl Into<String>,
        author_name: Option<String>,
        payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ContentId::new_local_at(now),
            content_type,
            payload,
            author_id: author_id.into(),
            author_name,
            status: None,
            created_at: now,
            updated_at: now,
            moderation_reason: None,
        }
    }

    /// Status used for transitions and filtering; a missing status is pending.
    pub fn effective_status(&self) -> ContentStatus {
        self.status.unwrap_or(ContentStatus::Pending)
    }

    /// Move to `to` if the transition table allows it.
    pub fn transition(&mut self, to: ContentStatus, reason: Option<String>) -> Result<(), CoreError> {
        validate_transition(self.effective_status(), to)?;
        self.status = Some(to);
        self.moderation_reason = reason;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Human-readable title: an explicit title/name, else a body excerpt.
    pub fn title(&self) -> Option<String> {
        TITLE_KEYS
            .iter()
            .filter_map(|k| self.payload.get(*k).and_then(|v| v.as_str()))
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| self.excerpt(TITLE_EXCERPT_CHARS))
    }

    /// The first `max_chars` characters of the body text, with an ellipsis
    /// when truncated.
    pub fn excerpt(&self, max_chars: usize) -> Option<String> {
        let body = BODY_KEYS
            .iter()
            .filter_map(|k| self.payload.get(*k).and_then(|v| v.as_str()))
            .map(str::trim)
            .find(|s| !s.is_empty())?;

        if body.chars().count() <= max_chars {
            return Some(body.to_string());
        }
        let mut cut: String = body.chars().take(max_chars).collect();
        cut.push('…');
        Some(cut)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
