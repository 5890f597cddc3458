//! Row model for the local `notifications` history.

use sqlx::FromRow;
use trailpost_core::notification::Notification;

use super::{from_millis, parse_column};

/// A row from the `notifications` table.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationRow {
    pub id: String,
    pub server_id: Option<String>,
    pub content_type: String,
    pub content_id: String,
    pub content_title: Option<String>,
    pub status: String,
    pub reason: Option<String>,
    pub message: String,
    pub is_read: bool,
    pub created_at: i64,
}

impl NotificationRow {
    pub fn into_notification(self) -> Result<Notification, sqlx::Error> {
        Ok(Notification {
            id: self.id,
            server_id: self.server_id,
            content_type: parse_column(&self.content_type)?,
            content_id: self.content_id,
            content_title: self.content_title,
            status: parse_column(&self.status)?,
            reason: self.reason,
            message: self.message,
            timestamp: from_millis(self.created_at)?,
            read: self.is_read,
        })
    }
}
