//! Traits at the remote boundary.
//!
//! The moderation engine depends on these traits rather than on
//! [`HttpRemote`](crate::HttpRemote) so sessions can be wired against
//! any transport, and tests against in-memory fakes.

use async_trait::async_trait;
use trailpost_core::{ContentItem, ContentStatus, ContentType};

use crate::error::RemoteError;
use crate::messages::{RemoteNotification, TaskCounts};

/// Query parameters for a content listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// `None` lists every status.
    pub status: Option<ContentStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    pub fn with_status(status: ContentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// One page of a remote content listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<ContentItem>,
    pub total: i64,
}

/// The remote content and moderation endpoints.
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// `GET /{collection}`.
    async fn list(&self, content_type: ContentType, query: &ListQuery)
        -> Result<Page, RemoteError>;

    /// `POST /moderation/{collection}/{id}/approve`.
    ///
    /// `Ok(None)` means the call succeeded without proving that a
    /// persisted record exists.
    async fn approve(
        &self,
        content_type: ContentType,
        id: &str,
    ) -> Result<Option<ContentItem>, RemoteError>;

    /// `POST /moderation/{collection}/{id}/reject`.
    async fn reject(&self, content_type: ContentType, id: &str, reason: &str)
        -> Result<(), RemoteError>;

    /// `POST /moderation/{collection}/{id}/revision`.
    async fn request_revision(
        &self,
        content_type: ContentType,
        id: &str,
        reason: Option<&str>,
    ) -> Result<(), RemoteError>;

    /// `POST /moderation/{collection}/{id}/hide`.
    async fn hide(
        &self,
        content_type: ContentType,
        id: &str,
        reason: Option<&str>,
    ) -> Result<(), RemoteError>;

    /// `POST /moderation/approve-local`: create an active record from a
    /// local draft. Same `Ok(None)` contract as [`approve`](Self::approve).
    async fn approve_local(&self, item: &ContentItem) -> Result<Option<ContentItem>, RemoteError>;

    /// `GET /moderation/tasks-count`.
    async fn task_counts(&self) -> Result<TaskCounts, RemoteError>;
}

/// The server-persisted notification feed.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// `GET /notifications?unreadOnly=&limit=`.
    async fn list(
        &self,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<RemoteNotification>, RemoteError>;

    /// `POST /notifications/{id}/read`.
    async fn mark_read(&self, server_id: &str) -> Result<(), RemoteError>;

    /// `POST /notifications/read-all`.
    async fn mark_all_read(&self) -> Result<(), RemoteError>;

    /// `GET /notifications/unread-count`.
    async fn unread_count(&self) -> Result<i64, RemoteError>;
}
