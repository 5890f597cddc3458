//! Repository for the local `notifications` history.

use trailpost_core::notification::{Notification, NotificationStatus};
use trailpost_core::types::Timestamp;
use trailpost_core::ContentType;

use crate::models::notification::NotificationRow;
use crate::models::to_millis;
use crate::DbPool;

/// Column list for `notifications` queries.
const COLUMNS: &str = "id, server_id, content_type, content_id, content_title, status, reason, \
                       message, is_read, created_at";

/// Provides insert/list/read-state operations for notification history.
pub struct NotificationRepo;

impl NotificationRepo {
    /// Insert a notification unless one already exists for the same
    /// content and status, or with the same server id.
    ///
    /// Returns `true` if the row was inserted.
    pub async fn insert_if_absent(
        pool: &DbPool,
        notification: &Notification,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO notifications \
             (id, server_id, content_type, content_id, content_title, status, reason, message, \
              is_read, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
             ON CONFLICT DO NOTHING",
        )
        .bind(&notification.id)
        .bind(&notification.server_id)
        .bind(notification.content_type.as_str())
        .bind(&notification.content_id)
        .bind(&notification.content_title)
        .bind(notification.status.as_str())
        .bind(&notification.reason)
        .bind(&notification.message)
        .bind(notification.read)
        .bind(to_millis(notification.timestamp))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find a notification by local id.
    pub async fn find(pool: &DbPool, id: &str) -> Result<Option<Notification>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM notifications WHERE id = ?1");
        sqlx::query_as::<_, NotificationRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(NotificationRow::into_notification)
            .transpose()
    }

    /// Find the notification already recorded for a content/status pair.
    pub async fn find_by_content(
        pool: &DbPool,
        content_type: ContentType,
        content_id: &str,
        status: NotificationStatus,
    ) -> Result<Option<Notification>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notifications \
             WHERE content_type = ?1 AND content_id = ?2 AND status = ?3"
        );
        sqlx::query_as::<_, NotificationRow>(&query)
            .bind(content_type.as_str())
            .bind(content_id)
            .bind(status.as_str())
            .fetch_optional(pool)
            .await?
            .map(NotificationRow::into_notification)
            .transpose()
    }

    /// List notifications, newest first.
    pub async fn list(
        pool: &DbPool,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        let query = if unread_only {
            format!(
                "SELECT {COLUMNS} FROM notifications WHERE is_read = 0 \
                 ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2"
            )
        } else {
            format!(
                "SELECT {COLUMNS} FROM notifications \
                 ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2"
            )
        };
        let rows = sqlx::query_as::<_, NotificationRow>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;
        rows.into_iter()
            .map(NotificationRow::into_notification)
            .collect()
    }

    pub async fn unread_count(pool: &DbPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE is_read = 0")
            .fetch_one(pool)
            .await
    }

    /// Mark one notification read. Returns `true` if its state changed.
    pub async fn mark_read(pool: &DbPool, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ?1 AND is_read = 0")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark every notification read. Returns the number changed.
    pub async fn mark_all_read(pool: &DbPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE is_read = 0")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Attach the server-side id once the remote copy is known.
    pub async fn attach_server_id(
        pool: &DbPool,
        id: &str,
        server_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notifications SET server_id = ?2 WHERE id = ?1 AND server_id IS NULL",
        )
        .bind(id)
        .bind(server_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete notifications created before `cutoff`. Returns the number removed.
    pub async fn delete_created_before(
        pool: &DbPool,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notifications WHERE created_at < ?1")
            .bind(to_millis(cutoff))
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn clear(pool: &DbPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notifications")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
