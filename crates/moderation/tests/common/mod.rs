//! Shared fakes for the moderation integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use trailpost_core::{ContentId, ContentItem, ContentStatus, ContentType, PendingEntry};
use trailpost_db::open_in_memory;
use trailpost_events::{CrossTabChannel, RetryPolicy};
use trailpost_moderation::{HeuristicClassifier, ModerationConfig, Session, SessionParts};
use trailpost_remote::messages::{RemoteNotification, TaskCounts};
use trailpost_remote::{ContentApi, ListQuery, NotificationApi, Page, RemoteError};

/// First id handed out by [`FakeContentApi::approve_local`].
pub const FIRST_PERSISTED_ID: u64 = 48213;

/// In-memory remote store that records every call.
pub struct FakeContentApi {
    records: Mutex<Vec<ContentItem>>,
    calls: Mutex<Vec<String>>,
    next_id: AtomicU64,
    /// Mutations succeed without returning a persisted record.
    pub drop_records: AtomicBool,
    /// Every call fails with a timeout.
    pub offline: AtomicBool,
    /// Listings come back empty, as if a replica lagged behind.
    pub lagging: AtomicBool,
    /// Delay applied to mutations.
    pub latency: Mutex<Duration>,
}

impl Default for FakeContentApi {
    fn default() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(FIRST_PERSISTED_ID),
            drop_records: AtomicBool::new(false),
            offline: AtomicBool::new(false),
            lagging: AtomicBool::new(false),
            latency: Mutex::new(Duration::ZERO),
        }
    }
}

impl FakeContentApi {
    pub fn seed(&self, item: ContentItem) {
        self.records.lock().unwrap().push(item);
    }

    pub fn record(&self, id: &str) -> Option<ContentItem> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id.as_str() == id)
            .cloned()
    }

    pub fn records(&self) -> Vec<ContentItem> {
        self.records.lock().unwrap().clone()
    }

    /// Number of calls whose name is `name`.
    pub fn calls(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.split(':').next() == Some(name))
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    async fn enter(&self, call: String) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(call);
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Timeout);
        }
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }

    fn set_status(
        &self,
        content_type: ContentType,
        id: &str,
        status: ContentStatus,
        reason: Option<&str>,
    ) -> Result<ContentItem, RemoteError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.content_type == content_type && r.id.as_str() == id)
            .ok_or_else(|| RemoteError::NotFound(format!("/{}/{id}", content_type.collection())))?;
        record.status = Some(status);
        record.moderation_reason = reason.map(str::to_string);
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}

#[async_trait]
impl ContentApi for FakeContentApi {
    async fn list(&self, content_type: ContentType, query: &ListQuery) -> Result<Page, RemoteError> {
        self.enter(format!("list:{content_type}")).await?;
        if self.lagging.load(Ordering::SeqCst) {
            return Ok(Page::default());
        }
        let items: Vec<ContentItem> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.content_type == content_type)
            .filter(|r| query.status.map_or(true, |s| r.status == Some(s)))
            .cloned()
            .collect();
        Ok(Page {
            total: items.len() as i64,
            items,
        })
    }

    async fn approve(
        &self,
        content_type: ContentType,
        id: &str,
    ) -> Result<Option<ContentItem>, RemoteError> {
        self.enter(format!("approve:{id}")).await?;
        let record = self.set_status(content_type, id, ContentStatus::Active, None)?;
        if self.drop_records.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn reject(&self, content_type: ContentType, id: &str, reason: &str) -> Result<(), RemoteError> {
        self.enter(format!("reject:{id}")).await?;
        self.set_status(content_type, id, ContentStatus::Rejected, Some(reason))?;
        Ok(())
    }

    async fn request_revision(
        &self,
        content_type: ContentType,
        id: &str,
        reason: Option<&str>,
    ) -> Result<(), RemoteError> {
        self.enter(format!("revision:{id}")).await?;
        self.set_status(content_type, id, ContentStatus::Revision, reason)?;
        Ok(())
    }

    async fn hide(
        &self,
        content_type: ContentType,
        id: &str,
        reason: Option<&str>,
    ) -> Result<(), RemoteError> {
        self.enter(format!("hide:{id}")).await?;
        self.set_status(content_type, id, ContentStatus::Hidden, reason)?;
        Ok(())
    }

    async fn approve_local(&self, item: &ContentItem) -> Result<Option<ContentItem>, RemoteError> {
        self.enter(format!("approve_local:{}", item.id)).await?;
        if self.drop_records.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut record = item.clone();
        record.id = ContentId::remote(id.to_string());
        record.status = Some(ContentStatus::Active);
        record.updated_at = Utc::now();
        self.seed(record.clone());
        Ok(Some(record))
    }

    async fn task_counts(&self) -> Result<TaskCounts, RemoteError> {
        self.enter("task_counts".to_string()).await?;
        let records = self.records.lock().unwrap();
        let pending = |t: ContentType| {
            records
                .iter()
                .filter(|r| r.content_type == t && r.status == Some(ContentStatus::Pending))
                .count() as i64
        };
        Ok(TaskCounts {
            markers: pending(ContentType::Marker),
            events: pending(ContentType::Event),
            posts: pending(ContentType::Post),
        })
    }
}

/// A server notification feed with nothing in it.
#[derive(Default)]
pub struct EmptyFeed;

#[async_trait]
impl NotificationApi for EmptyFeed {
    async fn list(&self, _unread_only: bool, _limit: i64) -> Result<Vec<RemoteNotification>, RemoteError> {
        Ok(Vec::new())
    }

    async fn mark_read(&self, _server_id: &str) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn unread_count(&self) -> Result<i64, RemoteError> {
        Ok(0)
    }
}

/// Defaults with a sweep fast enough for tests.
pub fn test_config() -> ModerationConfig {
    ModerationConfig {
        sweep: RetryPolicy {
            attempts: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: false,
        },
        ..ModerationConfig::default()
    }
}

pub async fn start_session(
    api: Arc<FakeContentApi>,
    channel: CrossTabChannel,
    user_id: Option<&str>,
) -> Session {
    let pool = open_in_memory().await.unwrap();
    Session::start(
        test_config(),
        SessionParts {
            content_api: api,
            notification_api: Arc::new(EmptyFeed),
            classifier: Arc::new(HeuristicClassifier::new().unwrap()),
            pool,
            channel,
            user_id: user_id.map(str::to_string),
        },
    )
}

/// A server record as the remote store would list it.
pub fn remote_item(id: &str, status: ContentStatus, author: &str, title: &str) -> ContentItem {
    let mut item = ContentItem::new_local(
        ContentType::Post,
        author,
        None,
        json!({ "title": title, "body": format!("{title} body") }),
    );
    item.id = ContentId::remote(id);
    item.status = Some(status);
    item
}

/// The offline draft from the moderation walkthrough.
pub fn lake_trip_draft() -> PendingEntry {
    let mut item = ContentItem::new_local(
        ContentType::Post,
        "u-9",
        Some("Nika".to_string()),
        json!({ "title": "Lake trip" }),
    );
    item.id = ContentId::Local("pending_1700000000_ab12cd3".to_string());
    PendingEntry::new(item)
}
