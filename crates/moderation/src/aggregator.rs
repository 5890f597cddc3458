//! Read-side views merging the remote store with the local pending queue.
//!
//! Remote records always win over local entries with the same id.
//! Transport failures degrade a view to its local part instead of
//! failing it; the returned [`FeedPage`] says so.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use trailpost_core::ai::AiDecision;
use trailpost_core::{ContentId, ContentItem, ContentStatus, ContentType, PendingEntry};
use trailpost_remote::{ContentApi, ListQuery};

use crate::error::ModerationResult;
use crate::store::PendingStore;

/// One row of a merged view.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub item: ContentItem,
    /// Advisory decision, when the item is still queued locally.
    pub ai_decision: Option<AiDecision>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    /// Matching items before pagination.
    pub total: usize,
    /// `false` when the remote store could not be reached.
    pub remote_available: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BadgeCounts {
    pub by_type: BTreeMap<ContentType, i64>,
    pub remote_available: bool,
}

impl BadgeCounts {
    pub fn total(&self) -> i64 {
        self.by_type.values().sum()
    }
}

/// Union two result sets by id. On a collision the remote entry is kept
/// unchanged; duplicate ids within one side keep their first occurrence.
pub fn merge_by_id(remote: Vec<ContentItem>, local: Vec<ContentItem>) -> Vec<ContentItem> {
    let mut seen: HashSet<ContentId> = HashSet::new();
    remote
        .into_iter()
        .chain(local)
        .filter(|item| seen.insert(item.id.clone()))
        .collect()
}

/// Whether an item belongs in the pending moderation queue.
fn awaits_decision(item: &ContentItem) -> bool {
    matches!(item.status, None | Some(ContentStatus::Pending))
}

#[derive(Clone)]
pub struct FeedAggregator {
    store: PendingStore,
    api: Arc<dyn ContentApi>,
    stale_after: Duration,
}

impl FeedAggregator {
    pub fn new(store: PendingStore, api: Arc<dyn ContentApi>, stale_after: Duration) -> Self {
        Self {
            store,
            api,
            stale_after,
        }
    }

    /// The moderation queue for one content type.
    ///
    /// `status` of `None` lists every status. A `Pending` queue contains
    /// only items that are pending or have no status yet; anything else
    /// is dropped and logged. Stale local entries are evicted first.
    pub async fn list_for_moderation_queue(
        &self,
        content_type: ContentType,
        status: Option<ContentStatus>,
        limit: usize,
        offset: usize,
    ) -> ModerationResult<FeedPage> {
        self.store.evict_stale(content_type, self.stale_after).await?;

        let query = ListQuery {
            status,
            ..Default::default()
        };
        let (remote, remote_available) = match self.api.list(content_type, &query).await {
            Ok(page) => (page.items, true),
            Err(e) => {
                tracing::warn!(
                    content_type = %content_type,
                    error = %e,
                    "Remote queue unavailable, showing local entries only",
                );
                (Vec::new(), false)
            }
        };
        let entries = self.store.get_all(Some(content_type)).await?;
        let (local, decisions) = split_entries(entries);
        let local = retain_unsuperseded(local, &remote, remote_available);

        let mut items: Vec<ContentItem> = merge_by_id(remote, local)
            .into_iter()
            .filter(|item| match status {
                Some(ContentStatus::Pending) => {
                    let keep = awaits_decision(item);
                    if !keep {
                        tracing::warn!(
                            content_type = %content_type,
                            content_id = %item.id,
                            status = %item.effective_status(),
                            "Dropping already-decided item from pending queue",
                        );
                    }
                    keep
                }
                Some(wanted) => item.effective_status() == wanted,
                None => true,
            })
            .collect();

        Ok(paginate(&mut items, decisions, limit, offset, remote_available))
    }

    /// What `author_id` sees in their feed: every active item, plus
    /// their own pending items. `None` is a guest, who sees only active
    /// items.
    pub async fn list_for_author_feed(
        &self,
        content_type: ContentType,
        author_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> ModerationResult<FeedPage> {
        let (remote, remote_available) =
            match self.api.list(content_type, &ListQuery::default()).await {
                Ok(page) => (page.items, true),
                Err(e) => {
                    tracing::debug!(
                        content_type = %content_type,
                        error = %e,
                        "Remote feed unavailable, showing local entries only",
                    );
                    (Vec::new(), false)
                }
            };
        let entries = self.store.get_all(Some(content_type)).await?;
        let (local, decisions) = split_entries(entries);
        let local = retain_unsuperseded(local, &remote, remote_available);

        let mut items: Vec<ContentItem> = merge_by_id(remote, local)
            .into_iter()
            .filter(|item| match item.effective_status() {
                ContentStatus::Active => true,
                ContentStatus::Pending => author_id.is_some_and(|a| a == item.author_id),
                _ => false,
            })
            .collect();

        Ok(paginate(&mut items, decisions, limit, offset, remote_available))
    }

    /// Items awaiting moderation per type, for dashboard badges.
    ///
    /// Remote counters are added to local counts; when the remote store
    /// is unreachable only local counts are returned.
    pub async fn badge_counts(&self) -> ModerationResult<BadgeCounts> {
        let mut by_type = self.store.count_by_type().await?;
        let remote_available = match self.api.task_counts().await {
            Ok(remote) => {
                for (content_type, count) in by_type.iter_mut() {
                    *count += remote.get(*content_type).unwrap_or(0);
                }
                true
            }
            Err(e) => {
                tracing::debug!(error = %e, "Remote task counts unavailable");
                false
            }
        };
        Ok(BadgeCounts {
            by_type,
            remote_available,
        })
    }
}

fn split_entries(
    entries: Vec<PendingEntry>,
) -> (Vec<ContentItem>, HashMap<ContentId, AiDecision>) {
    let mut decisions = HashMap::new();
    let items = entries
        .into_iter()
        .map(|entry| {
            if let Some(decision) = entry.ai_decision {
                decisions.insert(entry.item.id.clone(), decision);
            }
            entry.item
        })
        .collect();
    (items, decisions)
}

/// Drop local copies of server records the server did not return.
///
/// The server owns the status of anything with a remote id, so a
/// queued copy it no longer lists under the requested filter has been
/// decided elsewhere. Local drafts are always kept.
fn retain_unsuperseded(
    local: Vec<ContentItem>,
    remote: &[ContentItem],
    remote_available: bool,
) -> Vec<ContentItem> {
    if !remote_available {
        return local;
    }
    let listed: HashSet<&ContentId> = remote.iter().map(|item| &item.id).collect();
    local
        .into_iter()
        .filter(|item| {
            let keep = item.id.is_local() || listed.contains(&item.id);
            if !keep {
                tracing::debug!(content_id = %item.id, "Skipping local copy superseded by server");
            }
            keep
        })
        .collect()
}

/// Sort newest first, then cut one page.
fn paginate(
    items: &mut Vec<ContentItem>,
    mut decisions: HashMap<ContentId, AiDecision>,
    limit: usize,
    offset: usize,
    remote_available: bool,
) -> FeedPage {
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let total = items.len();
    let items = items
        .drain(..)
        .skip(offset)
        .take(limit)
        .map(|item| FeedItem {
            ai_decision: decisions.remove(&item.id),
            item,
        })
        .collect();
    FeedPage {
        items,
        total,
        remote_available,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::json;

    use super::*;

    fn item(id: ContentId, status: Option<ContentStatus>, title: &str) -> ContentItem {
        let mut item = ContentItem::new_local(ContentType::Post, "u-1", None, json!({ "title": title }));
        item.id = id;
        item.status = status;
        item
    }

    #[test]
    fn merge_keeps_one_entry_per_id_and_remote_wins() {
        let remote = vec![
            item(ContentId::remote("1"), Some(ContentStatus::Active), "remote one"),
            item(ContentId::remote("2"), Some(ContentStatus::Pending), "remote two"),
        ];
        let local = vec![
            item(ContentId::remote("2"), None, "stale local two"),
            item(ContentId::Local("pending_1_a".into()), None, "draft"),
        ];

        let merged = merge_by_id(remote.clone(), local);
        assert_eq!(merged.len(), 3);
        let two = merged.iter().find(|i| i.id == ContentId::remote("2")).unwrap();
        assert_eq!(two, &remote[1]);
    }

    #[test]
    fn merge_dedupes_within_one_side() {
        let a = item(ContentId::remote("9"), Some(ContentStatus::Active), "first");
        let b = item(ContentId::remote("9"), Some(ContentStatus::Hidden), "second");
        let merged = merge_by_id(vec![a.clone(), b], Vec::new());
        assert_eq!(merged, vec![a]);
    }

    #[test]
    fn local_and_remote_ids_with_same_text_are_distinct() {
        let remote = vec![item(ContentId::remote("pending_1_a"), Some(ContentStatus::Active), "r")];
        let local = vec![item(ContentId::Local("pending_1_a".into()), None, "l")];
        assert_eq!(merge_by_id(remote, local).len(), 2);
    }

    #[test]
    fn server_supersedes_local_copies_only_when_reachable() {
        let remote = vec![item(ContentId::remote("1"), Some(ContentStatus::Pending), "listed")];
        let local = vec![
            item(ContentId::remote("1"), None, "copy of listed"),
            item(ContentId::remote("2"), None, "decided elsewhere"),
            item(ContentId::Local("pending_1_a".into()), None, "draft"),
        ];

        let kept = retain_unsuperseded(local.clone(), &remote, true);
        let ids: Vec<&str> = kept.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "pending_1_a"]);

        assert_eq!(retain_unsuperseded(local, &[], false).len(), 3);
    }

    #[test]
    fn paginate_sorts_newest_first() {
        let now = Utc::now();
        let mut items: Vec<ContentItem> = (0..5)
            .map(|n| {
                let mut i = item(ContentId::remote(n.to_string()), None, "x");
                i.created_at = now - ChronoDuration::minutes(n);
                i
            })
            .rev()
            .collect();

        let page = paginate(&mut items, HashMap::new(), 2, 1, true);
        assert_eq!(page.total, 5);
        let ids: Vec<&str> = page.items.iter().map(|f| f.item.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }
}
