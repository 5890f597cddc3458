//! Per-recipient notification history.
//!
//! [`NotificationCenter`] turns bus events into [`Notification`]s, keeps
//! them in the local store with read/unread state, and periodically
//! reconciles the server-persisted feed into the same history so a
//! returning user sees what they missed. Receiving the same
//! `(content id, status)` twice records one notification.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use trailpost_core::notification::{Notification, NotificationStatus, DEFAULT_RETENTION_DAYS};
use trailpost_db::repositories::{NotificationRepo, SettingRepo};
use trailpost_db::DbPool;
use trailpost_remote::NotificationApi;

use crate::bus::{Envelope, ModerationEvent};

/// Settings key of the enable/disable switch.
pub const ENABLED_SETTING: &str = "notifications.enabled";

/// Server notifications fetched per poll.
const REMOTE_FETCH_LIMIT: i64 = 10;

/// Lower bound on the server poll cadence.
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Capacity of the live listener channel.
const LISTENER_CAPACITY: usize = 64;

pub struct NotificationCenter {
    pool: DbPool,
    remote: Option<Arc<dyn NotificationApi>>,
    /// Only events about this author's content are recorded; `None`
    /// records everything.
    recipient: Option<String>,
    retention: chrono::Duration,
    listeners: broadcast::Sender<Notification>,
}

impl NotificationCenter {
    pub fn new(pool: DbPool) -> Self {
        let (listeners, _) = broadcast::channel(LISTENER_CAPACITY);
        Self {
            pool,
            remote: None,
            recipient: None,
            retention: chrono::Duration::days(DEFAULT_RETENTION_DAYS),
            listeners,
        }
    }

    /// Reconcile with a server-persisted feed.
    pub fn with_remote(mut self, remote: Arc<dyn NotificationApi>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_recipient(mut self, author_id: impl Into<String>) -> Self {
        self.recipient = Some(author_id.into());
        self
    }

    /// Keep notifications for `days`. A non-positive or out-of-range
    /// value is ignored with a warning and the current window is kept.
    pub fn with_retention_days(mut self, days: i64) -> Self {
        match chrono::Duration::try_days(days).filter(|_| days > 0) {
            Some(retention) => self.retention = retention,
            None => tracing::warn!(days, "Ignoring invalid notification retention"),
        }
        self
    }

    // ---- settings ----

    pub async fn is_enabled(&self) -> Result<bool, sqlx::Error> {
        let value = SettingRepo::get(&self.pool, ENABLED_SETTING).await?;
        Ok(value.as_deref() != Some("false"))
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<(), sqlx::Error> {
        let value = if enabled { "true" } else { "false" };
        SettingRepo::set(&self.pool, ENABLED_SETTING, value).await
    }

    // ---- recording ----

    /// Live feed of newly recorded notifications, for toasts.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.listeners.subscribe()
    }

    /// Record a notification unless it duplicates one already held or
    /// notifications are disabled. Returns `true` if it was recorded.
    pub async fn notify(&self, notification: Notification) -> Result<bool, sqlx::Error> {
        if !self.is_enabled().await? {
            return Ok(false);
        }
        let inserted = NotificationRepo::insert_if_absent(&self.pool, &notification).await?;
        if inserted {
            tracing::info!(
                content_type = %notification.content_type,
                content_id = %notification.content_id,
                status = notification.status.as_str(),
                "Notification recorded",
            );
            let _ = self.listeners.send(notification);
        } else {
            tracing::debug!(
                content_id = %notification.content_id,
                status = notification.status.as_str(),
                "Duplicate notification ignored",
            );
        }
        Ok(inserted)
    }

    /// Build the notification an event produces for this recipient, if any.
    ///
    /// `content-hidden` produces none; `content-pending` only when the
    /// event asks to be shown once.
    pub fn notification_for(&self, event: &ModerationEvent) -> Option<Notification> {
        if let ModerationEvent::ContentPending {
            show_once: false, ..
        } = event
        {
            return None;
        }
        let status = NotificationStatus::from_content_status(event.status())?;
        let subject = event.subject();
        if let Some(recipient) = &self.recipient {
            if subject.author_id.as_deref() != Some(recipient.as_str()) {
                return None;
            }
        }
        Some(Notification::new(
            subject.content_type,
            subject.content_id.as_str(),
            subject.title.clone(),
            status,
            event.reason().map(str::to_string),
        ))
    }

    /// Record the notification for one bus event.
    pub async fn handle(&self, envelope: &Envelope) -> Result<bool, sqlx::Error> {
        match self.notification_for(&envelope.event) {
            Some(notification) => self.notify(notification).await,
            None => Ok(false),
        }
    }

    /// Consume bus events until `cancel` fires or the bus closes.
    ///
    /// Prunes expired history once on start.
    pub async fn run(&self, mut events: broadcast::Receiver<Envelope>, cancel: CancellationToken) {
        if let Err(e) = self.prune().await {
            tracing::warn!(error = %e, "Failed to prune notification history");
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Notification center cancelled");
                    break;
                }
                received = events.recv() => match received {
                    Ok(envelope) => {
                        if let Err(e) = self.handle(&envelope).await {
                            tracing::error!(
                                error = %e,
                                topic = envelope.event.topic(),
                                "Failed to record notification",
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Notification center lagged, some events were missed");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bus closed, notification center shutting down");
                        break;
                    }
                }
            }
        }
    }

    // ---- history ----

    pub async fn history(
        &self,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        NotificationRepo::list(&self.pool, unread_only, limit, offset).await
    }

    pub async fn unread_count(&self) -> Result<i64, sqlx::Error> {
        NotificationRepo::unread_count(&self.pool).await
    }

    /// Mark one notification read, locally and on the server when it
    /// came from there. Server failures are ignored.
    pub async fn mark_read(&self, id: &str) -> Result<bool, sqlx::Error> {
        let changed = NotificationRepo::mark_read(&self.pool, id).await?;
        if let Some(remote) = &self.remote {
            let server_id = NotificationRepo::find(&self.pool, id)
                .await?
                .and_then(|n| n.server_id);
            if let Some(server_id) = server_id {
                if let Err(e) = remote.mark_read(&server_id).await {
                    tracing::debug!(error = %e, server_id = %server_id, "Remote mark-read failed");
                }
            }
        }
        Ok(changed)
    }

    /// Mark everything read. Server failures are ignored.
    pub async fn mark_all_read(&self) -> Result<u64, sqlx::Error> {
        let changed = NotificationRepo::mark_all_read(&self.pool).await?;
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.mark_all_read().await {
                tracing::debug!(error = %e, "Remote mark-all-read failed");
            }
        }
        Ok(changed)
    }

    pub async fn clear_history(&self) -> Result<u64, sqlx::Error> {
        NotificationRepo::clear(&self.pool).await
    }

    /// Drop notifications older than the retention window.
    pub async fn prune(&self) -> Result<u64, sqlx::Error> {
        let removed =
            NotificationRepo::delete_created_before(&self.pool, Utc::now() - self.retention)
                .await?;
        if removed > 0 {
            tracing::info!(removed, "Pruned expired notifications");
        }
        Ok(removed)
    }

    // ---- server feed ----

    /// Pull unread server notifications into the local history.
    ///
    /// Each imported notification is marked read on the server, since it
    /// now lives locally. Transport failures are logged at debug and
    /// yield zero; the next poll retries. Returns the number imported.
    pub async fn sync_remote(&self) -> Result<usize, sqlx::Error> {
        let Some(remote) = &self.remote else {
            return Ok(0);
        };

        let unread = match remote.unread_count().await {
            Ok(count) => count,
            Err(e) => {
                tracing::debug!(error = %e, "Notification poll failed");
                return Ok(0);
            }
        };
        if unread == 0 {
            return Ok(0);
        }

        let fetched = match remote.list(true, REMOTE_FETCH_LIMIT).await {
            Ok(list) => list,
            Err(e) => {
                tracing::debug!(error = %e, "Notification fetch failed");
                return Ok(0);
            }
        };

        let mut imported = 0;
        for server_notification in fetched {
            let Some(notification) = server_notification.into_notification() else {
                continue;
            };
            let server_id = notification.server_id.clone();
            let content_type = notification.content_type;
            let content_id = notification.content_id.clone();
            let status = notification.status;

            if self.notify(notification).await? {
                imported += 1;
            } else if let Some(server_id) = &server_id {
                // Already held from the bus: remember the server copy.
                if let Some(existing) = NotificationRepo::find_by_content(
                    &self.pool,
                    content_type,
                    &content_id,
                    status,
                )
                .await?
                {
                    NotificationRepo::attach_server_id(&self.pool, &existing.id, server_id)
                        .await?;
                }
            }

            if let Some(server_id) = &server_id {
                if let Err(e) = remote.mark_read(server_id).await {
                    tracing::debug!(error = %e, server_id = %server_id, "Remote mark-read failed");
                }
            }
        }

        if imported > 0 {
            tracing::info!(imported, "Imported server notifications");
        }
        Ok(imported)
    }

    /// Poll the server feed every `interval` until `cancel` fires.
    pub async fn run_poller(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval.max(MIN_POLL_INTERVAL));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Notification poller cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_remote().await {
                        tracing::error!(error = %e, "Failed to store server notifications");
                    }
                }
            }
        }
    }
}
