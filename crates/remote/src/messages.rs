//! Wire types exchanged with the remote store.
//!
//! Content rows come back as flat JSON objects whose envelope columns
//! (`id`, `status`, author, timestamps) sit next to the type-specific
//! fields. [`RemoteRecord`] keeps the raw object and splits it into a
//! [`ContentItem`] on demand.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use trailpost_core::notification::{Notification, NotificationStatus};
use trailpost_core::types::Timestamp;
use trailpost_core::{ContentId, ContentItem, ContentStatus, ContentType};

use crate::error::RemoteError;

/// Server ids arrive as JSON numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Number(i64),
    Text(String),
}

impl WireId {
    /// The id as a string, or `None` when it is blank.
    pub fn to_id_string(&self) -> Option<String> {
        match self {
            WireId::Number(n) => Some(n.to_string()),
            WireId::Text(s) if s.trim().is_empty() => None,
            WireId::Text(s) => Some(s.clone()),
        }
    }
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Parse a timestamp column: RFC 3339, a bare `YYYY-MM-DD HH:MM:SS`, or
/// unix milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<Timestamp> {
    match value {
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|naive| naive.and_utc())
            }),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Content records
// ---------------------------------------------------------------------------

const AUTHOR_ID_KEYS: &[&str] = &["author_id", "creator_id", "user_id"];
const AUTHOR_NAME_KEYS: &[&str] = &["author_name", "author_username", "username"];
const REASON_KEYS: &[&str] = &["moderation_reason", "rejection_reason"];
const ENVELOPE_KEYS: &[&str] = &["id", "status", "created_at", "updated_at", "content_type"];

/// A content row as returned by the remote store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteRecord(pub Map<String, Value>);

impl RemoteRecord {
    /// The persisted id, if the row carries a usable one.
    pub fn id(&self) -> Option<String> {
        self.0.get("id").and_then(value_as_id)
    }

    fn first_of(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .filter_map(|k| self.0.get(*k))
            .find(|v| !v.is_null())
    }

    /// Split the row into a [`ContentItem`].
    ///
    /// Fails when the row has no id or carries an unknown status; the
    /// remaining non-envelope columns become the payload.
    pub fn into_item(self, content_type: ContentType) -> Result<ContentItem, RemoteError> {
        let id = self
            .id()
            .ok_or_else(|| RemoteError::Decode("content row without id".to_string()))?;

        let status = match self.0.get("status").and_then(Value::as_str) {
            Some(raw) => Some(
                raw.parse::<ContentStatus>()
                    .map_err(|e| RemoteError::Decode(e.to_string()))?,
            ),
            None => None,
        };

        let author_id = self
            .first_of(AUTHOR_ID_KEYS)
            .and_then(value_as_id)
            .unwrap_or_default();
        let author_name = self
            .first_of(AUTHOR_NAME_KEYS)
            .and_then(Value::as_str)
            .map(str::to_string);
        let moderation_reason = self
            .first_of(REASON_KEYS)
            .and_then(Value::as_str)
            .map(str::to_string);
        let created_at = self
            .0
            .get("created_at")
            .and_then(parse_timestamp)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let updated_at = self
            .0
            .get("updated_at")
            .and_then(parse_timestamp)
            .unwrap_or(created_at);

        let payload: Map<String, Value> = self
            .0
            .into_iter()
            .filter(|(k, _)| {
                let k = k.as_str();
                !ENVELOPE_KEYS.contains(&k)
                    && !AUTHOR_ID_KEYS.contains(&k)
                    && !AUTHOR_NAME_KEYS.contains(&k)
                    && !REASON_KEYS.contains(&k)
            })
            .collect();

        Ok(ContentItem {
            id: ContentId::remote(id),
            content_type,
            payload: Value::Object(payload),
            author_id,
            author_name,
            status,
            created_at,
            updated_at,
            moderation_reason,
        })
    }

    /// Flatten an item back into the row shape the remote store uses.
    pub fn from_item(item: &ContentItem) -> Self {
        let mut row = match &item.payload {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        row.insert("id".into(), Value::String(item.id.as_str().to_string()));
        row.insert("author_id".into(), Value::String(item.author_id.clone()));
        if let Some(name) = &item.author_name {
            row.insert("author_name".into(), Value::String(name.clone()));
        }
        if let Some(status) = item.status {
            row.insert("status".into(), Value::String(status.as_str().to_string()));
        }
        if let Some(reason) = &item.moderation_reason {
            row.insert("moderation_reason".into(), Value::String(reason.clone()));
        }
        row.insert("created_at".into(), Value::String(item.created_at.to_rfc3339()));
        row.insert("updated_at".into(), Value::String(item.updated_at.to_rfc3339()));
        RemoteRecord(row)
    }
}

/// Response of `GET /{collection}`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ListResponse {
    #[serde(default)]
    pub data: Vec<RemoteRecord>,
    #[serde(default)]
    pub total: i64,
}

/// Response of the approve and create-from-local mutations.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MutationResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub content: Option<RemoteRecord>,
    #[serde(default)]
    pub id: Option<WireId>,
}

impl MutationResponse {
    /// The persisted record, or `None` when the response does not prove
    /// that a record with a server id exists.
    ///
    /// A top-level `id` fills in for a content row that lacks one.
    pub fn into_persisted(
        self,
        content_type: ContentType,
    ) -> Result<Option<ContentItem>, RemoteError> {
        let fallback_id = self.id.as_ref().and_then(WireId::to_id_string);
        let Some(mut record) = self.content else {
            return Ok(None);
        };
        if record.id().is_none() {
            match fallback_id {
                Some(id) => {
                    record.0.insert("id".into(), Value::String(id));
                }
                None => return Ok(None),
            }
        }
        record.into_item(content_type).map(Some)
    }
}

/// Body of `POST /moderation/approve-local`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveLocalRequest {
    pub content_type: String,
    pub local_id: String,
    pub content_data: Value,
    pub author_id: String,
}

impl ApproveLocalRequest {
    pub fn from_item(item: &ContentItem) -> Self {
        Self {
            content_type: item.content_type.as_str().to_string(),
            local_id: item.id.as_str().to_string(),
            content_data: item.payload.clone(),
            author_id: item.author_id.clone(),
        }
    }
}

/// Body of the reject, revision and hide mutations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasonBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Response of `GET /moderation/tasks-count`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    #[serde(default)]
    pub markers: i64,
    #[serde(default)]
    pub events: i64,
    #[serde(default)]
    pub posts: i64,
}

impl TaskCounts {
    /// The remote counter for a type, if the endpoint reports one.
    pub fn get(&self, content_type: ContentType) -> Option<i64> {
        match content_type {
            ContentType::Marker => Some(self.markers),
            ContentType::Event => Some(self.events),
            ContentType::Post => Some(self.posts),
            ContentType::Route | ContentType::Comment => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationMetadata {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// A server-persisted notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteNotification {
    pub id: WireId,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub content_id: Option<WireId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub metadata: Option<NotificationMetadata>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub created_at: Option<Value>,
}

impl RemoteNotification {
    /// Convert into a local history entry.
    ///
    /// Returns `None` for notifications that are not about a known
    /// content type (system messages, XP awards).
    pub fn into_notification(self) -> Option<Notification> {
        let content_type: ContentType = self.content_type.as_deref()?.parse().ok()?;
        let content_id = self.content_id.as_ref().and_then(WireId::to_id_string)?;
        let metadata = self.metadata.unwrap_or_default();
        let status = metadata
            .action
            .as_deref()
            .and_then(|a| a.parse::<NotificationStatus>().ok())
            .unwrap_or(NotificationStatus::Pending);

        let mut notification =
            Notification::new(content_type, content_id, self.title, status, metadata.reason);
        notification.server_id = self.id.to_id_string();
        if let Some(message) = self.message.filter(|m| !m.trim().is_empty()) {
            notification.message = message;
        }
        if let Some(ts) = self.created_at.as_ref().and_then(parse_timestamp) {
            notification.timestamp = ts;
        }
        notification.read = self.is_read;
        Some(notification)
    }
}

/// Response of `GET /notifications`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotificationList {
    #[serde(default)]
    pub notifications: Vec<RemoteNotification>,
    #[serde(default)]
    pub total: i64,
}

/// Response of `GET /notifications/unread-count`.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct UnreadCount {
    pub count: i64,
}
