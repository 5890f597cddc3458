//! The local pending store.
//!
//! A constructor-injected handle over the profile's SQLite store. All
//! writes to pending entries go through [`PendingStore::put`] and
//! [`PendingStore::remove`]; AI decisions are written to their own
//! table by the triage client, so the two writers never overwrite each
//! other's fields.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use trailpost_core::payload::validate_payload;
use trailpost_core::{ContentId, ContentItem, ContentStatus, ContentType, PendingEntry};
use trailpost_db::repositories::PendingRepo;
use trailpost_db::DbPool;

use crate::error::{ModerationError, ModerationResult};

#[derive(Clone)]
pub struct PendingStore {
    pool: DbPool,
}

impl PendingStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Insert or replace an entry; the last write wins.
    pub async fn put(&self, entry: &PendingEntry) -> Result<(), sqlx::Error> {
        PendingRepo::upsert(&self.pool, entry).await?;
        tracing::debug!(
            content_type = %entry.item.content_type,
            content_id = %entry.item.id,
            "Pending entry stored",
        );
        Ok(())
    }

    pub async fn get(
        &self,
        content_type: ContentType,
        id: &ContentId,
    ) -> Result<Option<PendingEntry>, sqlx::Error> {
        PendingRepo::find(&self.pool, content_type, id.as_str()).await
    }

    /// All entries, newest queued first.
    pub async fn get_all(
        &self,
        content_type: Option<ContentType>,
    ) -> Result<Vec<PendingEntry>, sqlx::Error> {
        PendingRepo::list(&self.pool, content_type).await
    }

    /// Delete an entry. Removing an absent entry is a no-op.
    pub async fn remove(&self, content_type: ContentType, id: &ContentId) -> Result<bool, sqlx::Error> {
        let removed = PendingRepo::delete(&self.pool, content_type, id.as_str()).await?;
        if removed {
            tracing::debug!(content_type = %content_type, content_id = %id, "Pending entry removed");
        }
        Ok(removed)
    }

    /// Entries awaiting a decision per type; every type is present.
    pub async fn count_by_type(&self) -> Result<BTreeMap<ContentType, i64>, sqlx::Error> {
        let mut counts: BTreeMap<ContentType, i64> =
            ContentType::ALL.into_iter().map(|t| (t, 0)).collect();
        for (raw, count) in PendingRepo::count_awaiting_by_type(&self.pool).await? {
            match raw.parse::<ContentType>() {
                Ok(t) => {
                    counts.insert(t, count);
                }
                Err(e) => tracing::warn!(error = %e, "Skipping count for unknown content type"),
            }
        }
        Ok(counts)
    }

    /// Remove entries of `content_type` queued more than `max_age` ago.
    pub async fn evict_stale(
        &self,
        content_type: ContentType,
        max_age: Duration,
    ) -> Result<u64, sqlx::Error> {
        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        let removed = PendingRepo::delete_queued_before(&self.pool, content_type, cutoff).await?;
        if removed > 0 {
            tracing::info!(content_type = %content_type, removed, "Evicted stale pending entries");
        }
        Ok(removed)
    }

    /// [`evict_stale`](Self::evict_stale) for every content type.
    pub async fn evict_all_stale(&self, max_age: Duration) -> Result<u64, sqlx::Error> {
        let mut removed = 0;
        for content_type in ContentType::ALL {
            removed += self.evict_stale(content_type, max_age).await?;
        }
        Ok(removed)
    }

    /// Validate and queue a new local draft.
    ///
    /// Fails with `Validation` before anything is written if the payload
    /// lacks the fields its type requires.
    pub async fn create_draft(
        &self,
        content_type: ContentType,
        author_id: &str,
        author_name: Option<String>,
        payload: serde_json::Value,
    ) -> ModerationResult<PendingEntry> {
        validate_payload(content_type, &payload)?;
        let item = ContentItem::new_local(content_type, author_id, author_name, payload);
        let entry = PendingEntry::new(item);
        self.put(&entry).await?;
        tracing::info!(
            content_type = %content_type,
            content_id = %entry.item.id,
            "Draft queued for moderation",
        );
        Ok(entry)
    }

    /// Send a local-only entry back to its author: rewrite its status to
    /// `revision` in place, keeping its id.
    pub async fn mark_revision(
        &self,
        content_type: ContentType,
        id: &ContentId,
        reason: Option<String>,
    ) -> ModerationResult<PendingEntry> {
        let mut entry = self
            .get(content_type, id)
            .await?
            .ok_or_else(|| ModerationError::Validation(format!("No pending entry {id}")))?;
        entry.item.transition(ContentStatus::Revision, reason)?;
        self.put(&entry).await?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;
    use trailpost_db::open_in_memory;

    use super::*;

    async fn store() -> PendingStore {
        PendingStore::new(open_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn offline_draft_is_local_without_status() {
        let store = store().await;
        let entry = store
            .create_draft(ContentType::Post, "u-9", None, json!({ "body": "Lake trip" }))
            .await
            .unwrap();

        assert!(entry.item.id.is_local());
        assert!(entry.item.id.as_str().starts_with("pending_"));
        let stored = store.get(ContentType::Post, &entry.item.id).await.unwrap().unwrap();
        assert_eq!(stored.item.status, None);
    }

    #[tokio::test]
    async fn invalid_draft_is_not_written() {
        let store = store().await;
        let err = store
            .create_draft(ContentType::Marker, "u-9", None, json!({ "title": "No coords" }))
            .await
            .unwrap_err();
        assert_matches!(err, ModerationError::Validation(_));
        assert!(store.get_all(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let store = store().await;
        let entry = store
            .create_draft(ContentType::Route, "u-1", None, json!({ "title": "Ridge loop" }))
            .await
            .unwrap();
        assert!(store.remove(ContentType::Route, &entry.item.id).await.unwrap());
        assert!(!store.remove(ContentType::Route, &entry.item.id).await.unwrap());
    }

    #[tokio::test]
    async fn counts_are_zero_filled() {
        let store = store().await;
        store
            .create_draft(ContentType::Comment, "u-1", None, json!({ "text": "Nice!" }))
            .await
            .unwrap();
        let counts = store.count_by_type().await.unwrap();
        assert_eq!(counts.len(), ContentType::ALL.len());
        assert_eq!(counts[&ContentType::Comment], 1);
        assert_eq!(counts[&ContentType::Post], 0);
    }

    #[tokio::test]
    async fn evict_stale_keeps_fresh_entries() {
        let store = store().await;
        let fresh = store
            .create_draft(ContentType::Post, "u-1", None, json!({ "body": "fresh" }))
            .await
            .unwrap();
        let mut stale = PendingEntry::new(ContentItem::new_local(
            ContentType::Post,
            "u-2",
            None,
            json!({ "body": "stale" }),
        ));
        stale.queued_at = Utc::now() - chrono::Duration::hours(2);
        store.put(&stale).await.unwrap();

        let removed = store
            .evict_all_stale(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        let left = store.get_all(None).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].item.id, fresh.item.id);
    }

    #[tokio::test]
    async fn mark_revision_rewrites_in_place() {
        let store = store().await;
        let entry = store
            .create_draft(ContentType::Event, "u-1", None, json!({ "title": "Meetup", "date": "2024-07-01" }))
            .await
            .unwrap();

        let updated = store
            .mark_revision(ContentType::Event, &entry.item.id, Some("Add a location".into()))
            .await
            .unwrap();
        assert_eq!(updated.item.id, entry.item.id);
        assert_eq!(updated.item.status, Some(ContentStatus::Revision));

        let err = store
            .mark_revision(ContentType::Event, &entry.item.id, None)
            .await
            .unwrap_err();
        assert_matches!(
            err,
            ModerationError::InvalidTransition { from: ContentStatus::Revision, to: ContentStatus::Revision }
        );
    }
}
