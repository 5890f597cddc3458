//! Integration tests for the local profile store.
//!
//! Exercises the repository layer against a migrated in-memory database:
//! - Pending entries upsert in place and join their AI decision
//! - A late AI decision never recreates a removed entry
//! - Reconciliation records the mapping and drops the entry atomically
//! - Moderation history rejects updates and deletes
//! - Notifications dedupe on content id and status

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use serde_json::json;
use trailpost_core::ai::{AiDecision, Suggestion, Verdict};
use trailpost_core::history::{HistoryFilter, ModerationAction, NewHistoryRecord};
use trailpost_core::notification::{Notification, NotificationStatus};
use trailpost_core::{ContentId, ContentItem, ContentStatus, ContentType, PendingEntry};
use trailpost_db::repositories::{
    AiDecisionRepo, HistoryRepo, NotificationRepo, PendingRepo, ReconciliationRepo, SettingRepo,
};
use trailpost_db::{open_in_memory, DbPool};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn pool() -> DbPool {
    open_in_memory().await.expect("in-memory store")
}

fn draft(content_type: ContentType, title: &str) -> ContentItem {
    ContentItem::new_local(
        content_type,
        "u-1",
        Some("Noor".to_string()),
        json!({ "title": title, "body": "Sunrise over the ridge" }),
    )
}

fn history_record(id: ContentId, action: ModerationAction) -> NewHistoryRecord {
    NewHistoryRecord {
        content_type: ContentType::Marker,
        content_id: id,
        resulting_id: None,
        action,
        reason: None,
        actor_id: "mod-1".to_string(),
        from_status: ContentStatus::Pending,
        to_status: ContentStatus::Active,
    }
}

// ---------------------------------------------------------------------------
// Pending entries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upsert_replaces_entry_in_place() {
    let pool = pool().await;
    let mut entry = PendingEntry::new(draft(ContentType::Marker, "Hut"));
    PendingRepo::upsert(&pool, &entry).await.unwrap();

    entry.item.payload = json!({ "title": "Mountain hut" });
    PendingRepo::upsert(&pool, &entry).await.unwrap();

    let all = PendingRepo::list(&pool, Some(ContentType::Marker)).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].item.id, entry.item.id);
    assert_eq!(all[0].item.title().as_deref(), Some("Mountain hut"));
    assert!(all[0].item.id.is_local());
}

#[tokio::test]
async fn list_filters_by_type_and_orders_newest_first() {
    let pool = pool().await;
    let mut older = PendingEntry::new(draft(ContentType::Post, "older"));
    older.queued_at = Utc::now() - Duration::minutes(5);
    let newer = PendingEntry::new(draft(ContentType::Post, "newer"));
    let other = PendingEntry::new(draft(ContentType::Event, "other"));
    for e in [&older, &newer, &other] {
        PendingRepo::upsert(&pool, e).await.unwrap();
    }

    let posts = PendingRepo::list(&pool, Some(ContentType::Post)).await.unwrap();
    let titles: Vec<_> = posts.iter().filter_map(|e| e.item.title()).collect();
    assert_eq!(titles, vec!["newer", "older"]);

    assert_eq!(PendingRepo::list(&pool, None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn entry_joins_its_ai_decision() {
    let pool = pool().await;
    let entry = PendingEntry::new(draft(ContentType::Route, "Loop"));
    PendingRepo::upsert(&pool, &entry).await.unwrap();

    let decision = AiDecision::new(Suggestion::Approve, 0.92)
        .with_category("travel")
        .with_issues(vec!["none".to_string()]);
    AiDecisionRepo::upsert(&pool, ContentType::Route, entry.item.id.as_str(), &decision)
        .await
        .unwrap();

    let found = PendingRepo::find(&pool, ContentType::Route, entry.item.id.as_str())
        .await
        .unwrap()
        .expect("entry");
    let ai = found.ai_decision.expect("joined decision");
    assert_eq!(ai.suggestion, Suggestion::Approve);
    assert_eq!(ai.issues, vec!["none".to_string()]);
    assert_eq!(ai.category.as_deref(), Some("travel"));
}

#[tokio::test]
async fn late_ai_decision_does_not_resurrect_removed_entry() {
    let pool = pool().await;
    let entry = PendingEntry::new(draft(ContentType::Post, "gone"));
    PendingRepo::upsert(&pool, &entry).await.unwrap();
    assert!(PendingRepo::delete(&pool, ContentType::Post, entry.item.id.as_str())
        .await
        .unwrap());

    let decision = AiDecision::new(Suggestion::Reject, 0.4);
    AiDecisionRepo::upsert(&pool, ContentType::Post, entry.item.id.as_str(), &decision)
        .await
        .unwrap();

    assert!(PendingRepo::find(&pool, ContentType::Post, entry.item.id.as_str())
        .await
        .unwrap()
        .is_none());
    assert!(PendingRepo::list(&pool, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn counts_exclude_revision_entries() {
    let pool = pool().await;
    let waiting = PendingEntry::new(draft(ContentType::Event, "waiting"));
    let mut sent_back = PendingEntry::new(draft(ContentType::Event, "sent back"));
    sent_back.item.status = Some(ContentStatus::Revision);
    PendingRepo::upsert(&pool, &waiting).await.unwrap();
    PendingRepo::upsert(&pool, &sent_back).await.unwrap();

    let counts = PendingRepo::count_awaiting_by_type(&pool).await.unwrap();
    assert_eq!(counts, vec![("event".to_string(), 1)]);
}

#[tokio::test]
async fn delete_queued_before_evicts_only_stale_entries() {
    let pool = pool().await;
    let mut stale = PendingEntry::new(draft(ContentType::Comment, "stale"));
    stale.queued_at = Utc::now() - Duration::hours(3);
    let fresh = PendingEntry::new(draft(ContentType::Comment, "fresh"));
    PendingRepo::upsert(&pool, &stale).await.unwrap();
    PendingRepo::upsert(&pool, &fresh).await.unwrap();

    let removed = PendingRepo::delete_queued_before(
        &pool,
        ContentType::Comment,
        Utc::now() - Duration::hours(1),
    )
    .await
    .unwrap();
    assert_eq!(removed, 1);

    let left = PendingRepo::list(&pool, None).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].item.id, fresh.item.id);
}

// ---------------------------------------------------------------------------
// AI decisions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_analysis_clears_previous_verdict() {
    let pool = pool().await;
    let id = "pending_1_abcdefg";
    AiDecisionRepo::upsert(&pool, ContentType::Post, id, &AiDecision::new(Suggestion::Hide, 0.7))
        .await
        .unwrap();
    assert!(AiDecisionRepo::set_verdict(&pool, ContentType::Post, id, Verdict::Correct)
        .await
        .unwrap());

    let verdicts = AiDecisionRepo::list_verdicts(&pool, None).await.unwrap();
    assert_eq!(verdicts, vec![Some("correct".to_string())]);

    AiDecisionRepo::upsert(&pool, ContentType::Post, id, &AiDecision::new(Suggestion::Approve, 0.9))
        .await
        .unwrap();
    let found = AiDecisionRepo::find(&pool, ContentType::Post, id)
        .await
        .unwrap()
        .expect("decision");
    assert_eq!(found.suggestion, Suggestion::Approve);
    assert_eq!(found.admin_verdict, None);
}

#[tokio::test]
async fn verdict_without_decision_reports_false() {
    let pool = pool().await;
    let updated = AiDecisionRepo::set_verdict(&pool, ContentType::Event, "42", Verdict::Incorrect)
        .await
        .unwrap();
    assert!(!updated);
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconcile_maps_local_id_and_drops_entry() {
    let pool = pool().await;
    let entry = PendingEntry::new(draft(ContentType::Marker, "Spring"));
    let local_id = entry.item.id.as_str().to_string();
    PendingRepo::upsert(&pool, &entry).await.unwrap();

    let mut persisted = entry.item.clone();
    persisted.id = ContentId::remote("501");
    persisted.status = Some(ContentStatus::Active);
    ReconciliationRepo::reconcile(&pool, ContentType::Marker, &local_id, &persisted)
        .await
        .unwrap();

    assert!(PendingRepo::find(&pool, ContentType::Marker, &local_id)
        .await
        .unwrap()
        .is_none());
    let mapped = ReconciliationRepo::find(&pool, ContentType::Marker, &local_id)
        .await
        .unwrap()
        .expect("mapping");
    assert_eq!(mapped.id, ContentId::remote("501"));

    // A second reconcile keeps the first mapping.
    let mut duplicate = persisted.clone();
    duplicate.id = ContentId::remote("502");
    ReconciliationRepo::reconcile(&pool, ContentType::Marker, &local_id, &duplicate)
        .await
        .unwrap();
    let mapped = ReconciliationRepo::find(&pool, ContentType::Marker, &local_id)
        .await
        .unwrap()
        .expect("mapping");
    assert_eq!(mapped.id, ContentId::remote("501"));
}

// ---------------------------------------------------------------------------
// Moderation history
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_is_append_only() {
    let pool = pool().await;
    let id = HistoryRepo::append(
        &pool,
        &history_record(ContentId::remote("7"), ModerationAction::Approve),
    )
    .await
    .unwrap();

    let update = sqlx::query("UPDATE moderation_history SET reason = 'edited' WHERE id = ?1")
        .bind(id)
        .execute(&pool)
        .await;
    assert_matches!(update, Err(sqlx::Error::Database(_)));

    let delete = sqlx::query("DELETE FROM moderation_history WHERE id = ?1")
        .bind(id)
        .execute(&pool)
        .await;
    assert_matches!(delete, Err(sqlx::Error::Database(_)));

    let all = HistoryRepo::list(&pool, &HistoryFilter::new()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].reason, None);
}

#[tokio::test]
async fn history_filters_and_follows_resulting_id() {
    let pool = pool().await;
    let local = ContentId::Local("pending_100_zzzzzzz".to_string());
    let mut created = history_record(local.clone(), ModerationAction::Approve);
    created.resulting_id = Some(ContentId::remote("900"));
    HistoryRepo::append(&pool, &created).await.unwrap();

    let mut hidden = history_record(ContentId::remote("900"), ModerationAction::Hide);
    hidden.from_status = ContentStatus::Active;
    hidden.to_status = ContentStatus::Hidden;
    HistoryRepo::append(&pool, &hidden).await.unwrap();

    HistoryRepo::append(&pool, &history_record(ContentId::remote("1"), ModerationAction::Reject))
        .await
        .unwrap();

    let filter = HistoryFilter {
        content_id: Some("900".to_string()),
        ..HistoryFilter::new()
    };
    let trail = HistoryRepo::list(&pool, &filter).await.unwrap();
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[0].action, ModerationAction::Hide);
    assert_eq!(trail[1].content_id, local);
    assert_eq!(trail[1].resulting_id, Some(ContentId::remote("900")));

    let filter = HistoryFilter {
        action: Some(ModerationAction::Reject),
        ..HistoryFilter::new()
    };
    assert_eq!(HistoryRepo::list(&pool, &filter).await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[tokio::test]
async fn notification_dedupes_on_content_and_status() {
    let pool = pool().await;
    let first = Notification::new(
        ContentType::Post,
        "55",
        Some("Ridge".to_string()),
        NotificationStatus::Approved,
        None,
    );
    let again = Notification::new(
        ContentType::Post,
        "55",
        Some("Ridge".to_string()),
        NotificationStatus::Approved,
        None,
    );
    let rejected = Notification::new(
        ContentType::Post,
        "55",
        None,
        NotificationStatus::Rejected,
        Some("Off topic".to_string()),
    );

    assert!(NotificationRepo::insert_if_absent(&pool, &first).await.unwrap());
    assert!(!NotificationRepo::insert_if_absent(&pool, &again).await.unwrap());
    assert!(NotificationRepo::insert_if_absent(&pool, &rejected).await.unwrap());

    assert_eq!(NotificationRepo::unread_count(&pool).await.unwrap(), 2);
    let stored = NotificationRepo::find(&pool, &rejected.id)
        .await
        .unwrap()
        .expect("rejected notification");
    assert_eq!(stored.message, "Off topic");
}

#[tokio::test]
async fn read_state_and_retention() {
    let pool = pool().await;
    let mut old = Notification::new(
        ContentType::Event,
        "3",
        None,
        NotificationStatus::Revision,
        None,
    );
    old.timestamp = Utc::now() - Duration::days(61);
    let recent = Notification::new(
        ContentType::Event,
        "4",
        None,
        NotificationStatus::Approved,
        None,
    );
    NotificationRepo::insert_if_absent(&pool, &old).await.unwrap();
    NotificationRepo::insert_if_absent(&pool, &recent).await.unwrap();

    assert!(NotificationRepo::mark_read(&pool, &recent.id).await.unwrap());
    assert!(!NotificationRepo::mark_read(&pool, &recent.id).await.unwrap());
    let unread = NotificationRepo::list(&pool, true, 10, 0).await.unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].id, old.id);

    let pruned = NotificationRepo::delete_created_before(&pool, Utc::now() - Duration::days(60))
        .await
        .unwrap();
    assert_eq!(pruned, 1);
    assert_eq!(NotificationRepo::mark_all_read(&pool).await.unwrap(), 0);
    assert_eq!(NotificationRepo::clear(&pool).await.unwrap(), 1);
}

#[tokio::test]
async fn settings_overwrite() {
    let pool = pool().await;
    assert_eq!(SettingRepo::get(&pool, "notifications.enabled").await.unwrap(), None);
    SettingRepo::set(&pool, "notifications.enabled", "true").await.unwrap();
    SettingRepo::set(&pool, "notifications.enabled", "false").await.unwrap();
    assert_eq!(
        SettingRepo::get(&pool, "notifications.enabled").await.unwrap().as_deref(),
        Some("false")
    );
}
