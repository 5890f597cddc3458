//! End-to-end moderation flows against an in-memory store and a fake
//! remote store:
//! - Offline drafts stay local until a moderator approves them
//! - Approving a draft reconciles it to the persisted record, once
//! - Reject requires a reason and never calls out without one
//! - Persistence failures and ambiguous not-founds keep the entry
//! - Concurrent actions on one item are refused while one is in flight

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use trailpost_core::history::{HistoryFilter, ModerationAction};
use trailpost_core::{ContentId, ContentStatus, ContentType};
use trailpost_events::{CrossTabChannel, ModerationEvent};
use trailpost_moderation::ModerationError;

use common::{lake_trip_draft, remote_item, start_session, FakeContentApi};

async fn next_event(
    rx: &mut tokio::sync::broadcast::Receiver<trailpost_events::Envelope>,
) -> ModerationEvent {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("event should be published")
        .unwrap()
        .event
}

#[tokio::test]
async fn offline_draft_stays_local() {
    let api = Arc::new(FakeContentApi::default());
    api.offline.store(true, Ordering::SeqCst);
    let session = start_session(api.clone(), CrossTabChannel::new(), None).await;

    let entry = session
        .submit_draft(ContentType::Post, None, json!({ "body": "Lake trip" }))
        .await
        .unwrap();

    assert_matches!(&entry.item.id, ContentId::Local(id) if id.starts_with("pending_"));
    assert_eq!(entry.item.status, None);
    let stored = session
        .store()
        .get(ContentType::Post, &entry.item.id)
        .await
        .unwrap()
        .expect("draft is queued locally");
    assert_eq!(stored.item.status, None);
    assert!(api.records().is_empty());
    assert_eq!(api.calls("approve_local"), 0);

    session.shutdown().await;
}

#[tokio::test]
async fn approving_a_draft_reconciles_it_once() {
    let api = Arc::new(FakeContentApi::default());
    let session = start_session(api.clone(), CrossTabChannel::new(), Some("mod-1")).await;
    let draft = lake_trip_draft();
    session.store().put(&draft).await.unwrap();
    let mut rx = session.bus().subscribe();

    let persisted = session.processor().approve(&draft.item).await.unwrap();

    assert_eq!(persisted.id, ContentId::remote("48213"));
    assert_eq!(persisted.status, Some(ContentStatus::Active));
    assert!(session
        .store()
        .get(ContentType::Post, &draft.item.id)
        .await
        .unwrap()
        .is_none());

    let event = next_event(&mut rx).await;
    assert_eq!(event.topic(), "content-approved");
    let subject = event.subject();
    assert_eq!(subject.content_type, ContentType::Post);
    assert_eq!(subject.content_id, ContentId::remote("48213"));
    assert_eq!(subject.author_id.as_deref(), Some("u-9"));

    // Approving the same draft again returns the reconciled record.
    let again = session.processor().approve(&draft.item).await.unwrap();
    assert_eq!(again.id, persisted.id);
    assert_eq!(api.calls("approve_local"), 1);
    assert_eq!(api.records().len(), 1);

    let history = session
        .log()
        .list(&HistoryFilter {
            content_id: Some("48213".into()),
            ..HistoryFilter::new()
        })
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, ModerationAction::Approve);
    assert_eq!(history[0].content_id, draft.item.id);
    assert_eq!(history[0].actor_id, "mod-1");

    session.shutdown().await;
}

#[tokio::test]
async fn approving_active_content_is_a_no_op() {
    let api = Arc::new(FakeContentApi::default());
    api.seed(remote_item("7", ContentStatus::Pending, "u-2", "Ridge loop"));
    let session = start_session(api.clone(), CrossTabChannel::new(), Some("mod-1")).await;

    let item = api.record("7").unwrap();
    let first = session.processor().approve(&item).await.unwrap();
    let second = session.processor().approve(&first).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(api.calls("approve"), 1);
    assert_eq!(api.records().len(), 1);

    session.shutdown().await;
}

#[tokio::test]
async fn reject_requires_a_reason() {
    let api = Arc::new(FakeContentApi::default());
    let session = start_session(api.clone(), CrossTabChannel::new(), Some("mod-1")).await;
    let draft = lake_trip_draft();
    session.store().put(&draft).await.unwrap();

    for reason in [Some(""), Some("   "), None] {
        let err = session.processor().reject(&draft.item, reason).await.unwrap_err();
        assert_matches!(err, ModerationError::Validation(_));
    }
    assert_eq!(api.total_calls(), 0);
    let stored = session
        .store()
        .get(ContentType::Post, &draft.item.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.item.effective_status(), ContentStatus::Pending);

    let rejected = session
        .processor()
        .reject(&draft.item, Some("spam"))
        .await
        .unwrap();
    assert_eq!(rejected.status, Some(ContentStatus::Rejected));
    // A local draft is dropped without calling the server.
    assert_eq!(api.total_calls(), 0);
    assert!(session.store().get_all(None).await.unwrap().is_empty());

    session.shutdown().await;
}

#[tokio::test]
async fn reject_remote_content_updates_the_server() {
    let api = Arc::new(FakeContentApi::default());
    api.seed(remote_item("12", ContentStatus::Pending, "u-2", "Free tours"));
    let session = start_session(api.clone(), CrossTabChannel::new(), Some("mod-1")).await;
    let mut rx = session.bus().subscribe();

    let item = api.record("12").unwrap();
    session.processor().reject(&item, Some("spam")).await.unwrap();

    let record = api.record("12").unwrap();
    assert_eq!(record.status, Some(ContentStatus::Rejected));
    assert_eq!(record.moderation_reason.as_deref(), Some("spam"));
    let event = next_event(&mut rx).await;
    assert_eq!(event.reason(), Some("spam"));

    // Rejected content cannot be approved without a new submission.
    let err = session.processor().approve(&record).await.unwrap_err();
    assert_matches!(
        err,
        ModerationError::InvalidTransition { from: ContentStatus::Rejected, to: ContentStatus::Active }
    );
    assert_eq!(api.calls("approve"), 0);

    session.shutdown().await;
}

#[tokio::test]
async fn missing_persisted_record_keeps_the_entry() {
    let api = Arc::new(FakeContentApi::default());
    api.drop_records.store(true, Ordering::SeqCst);
    let session = start_session(api.clone(), CrossTabChannel::new(), Some("mod-1")).await;
    let draft = lake_trip_draft();
    session.store().put(&draft).await.unwrap();

    let err = session.processor().approve(&draft.item).await.unwrap_err();
    assert_matches!(err, ModerationError::PersistenceFailure { id } if id == draft.item.id);
    assert!(session
        .store()
        .get(ContentType::Post, &draft.item.id)
        .await
        .unwrap()
        .is_some());
    assert!(session.log().list(&HistoryFilter::new()).await.unwrap().is_empty());

    // The moderator can retry once the server behaves.
    api.drop_records.store(false, Ordering::SeqCst);
    let persisted = session.processor().approve(&draft.item).await.unwrap();
    assert_eq!(persisted.status, Some(ContentStatus::Active));

    session.shutdown().await;
}

#[tokio::test]
async fn not_found_requires_explicit_recreation() {
    let api = Arc::new(FakeContentApi::default());
    let session = start_session(api.clone(), CrossTabChannel::new(), Some("mod-1")).await;
    let ghost = remote_item("999", ContentStatus::Pending, "u-4", "Old pier");

    let err = session.processor().approve(&ghost).await.unwrap_err();
    assert_matches!(err, ModerationError::AmbiguousNotFound { id } if id == ghost.id);
    assert_eq!(api.calls("approve_local"), 0);
    assert!(api.records().is_empty());

    let recreated = session.processor().approve_as_new(&ghost).await.unwrap();
    assert_eq!(recreated.status, Some(ContentStatus::Active));
    assert_eq!(recreated.payload, ghost.payload);
    assert_eq!(api.calls("approve_local"), 1);

    session.shutdown().await;
}

#[tokio::test]
async fn transport_failure_leaves_state_unchanged() {
    let api = Arc::new(FakeContentApi::default());
    api.seed(remote_item("3", ContentStatus::Pending, "u-2", "Harbor"));
    let item = api.record("3").unwrap();
    api.offline.store(true, Ordering::SeqCst);
    let session = start_session(api.clone(), CrossTabChannel::new(), Some("mod-1")).await;

    let err = session.processor().approve(&item).await.unwrap_err();
    assert_matches!(err, ModerationError::Transport(_));
    assert_eq!(api.record("3").unwrap().status, Some(ContentStatus::Pending));
    assert_eq!(api.calls("approve"), 1);

    session.shutdown().await;
}

#[tokio::test]
async fn second_action_while_in_flight_is_refused() {
    let api = Arc::new(FakeContentApi::default());
    api.seed(remote_item("5", ContentStatus::Pending, "u-2", "Canyon"));
    *api.latency.lock().unwrap() = Duration::from_millis(50);
    let session = start_session(api.clone(), CrossTabChannel::new(), Some("mod-1")).await;
    let item = api.record("5").unwrap();

    let processor = session.processor();
    let (first, second) = tokio::join!(processor.approve(&item), processor.approve(&item));

    assert!(first.is_ok());
    assert_matches!(second, Err(ModerationError::InFlight { .. }));
    assert_eq!(api.calls("approve"), 1);
    assert!(!processor.is_processing(ContentType::Post, &item.id));

    session.shutdown().await;
}

#[tokio::test]
async fn revision_and_resubmission() {
    let api = Arc::new(FakeContentApi::default());
    let session = start_session(api.clone(), CrossTabChannel::new(), Some("mod-1")).await;
    let draft = lake_trip_draft();
    session.store().put(&draft).await.unwrap();

    let revised = session
        .processor()
        .request_revision(&draft.item, Some("Add a photo"))
        .await
        .unwrap();
    assert_eq!(revised.id, draft.item.id);
    assert_eq!(revised.status, Some(ContentStatus::Revision));
    assert_eq!(api.total_calls(), 0);

    // Still queued under the same id, but no longer awaiting a moderator.
    let counts = session.store().count_by_type().await.unwrap();
    assert_eq!(counts[&ContentType::Post], 0);

    let err = session.processor().approve(&revised).await.unwrap_err();
    assert_matches!(err, ModerationError::InvalidTransition { .. });

    let fresh = session
        .resubmit(&revised, Some(json!({ "title": "Lake trip", "body": "With photos now" })))
        .await
        .unwrap();
    assert_ne!(fresh.item.id, draft.item.id);
    assert!(fresh.item.id.is_local());
    assert_eq!(fresh.item.effective_status(), ContentStatus::Pending);

    let entries = session.store().get_all(Some(ContentType::Post)).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].item.id, fresh.item.id);

    let history = session.log().list(&HistoryFilter::new()).await.unwrap();
    let actions: Vec<ModerationAction> = history.iter().map(|h| h.action).collect();
    assert_eq!(actions, vec![ModerationAction::Resubmit, ModerationAction::RequestRevision]);
    assert_eq!(history[0].content_id, draft.item.id);
    assert_eq!(history[0].resulting_id.as_ref(), Some(&fresh.item.id));

    session.shutdown().await;
}

#[tokio::test]
async fn hide_only_applies_to_published_content() {
    let api = Arc::new(FakeContentApi::default());
    api.seed(remote_item("21", ContentStatus::Active, "u-2", "Summit"));
    let session = start_session(api.clone(), CrossTabChannel::new(), Some("mod-1")).await;

    let draft = lake_trip_draft();
    let err = session.processor().hide(&draft.item, None).await.unwrap_err();
    assert_matches!(err, ModerationError::Validation(_));

    let item = api.record("21").unwrap();
    let hidden = session.processor().hide(&item, Some("Copyright")).await.unwrap();
    assert_eq!(hidden.status, Some(ContentStatus::Hidden));
    assert_eq!(api.record("21").unwrap().status, Some(ContentStatus::Hidden));

    let err = session.processor().reject(&hidden, Some("spam")).await.unwrap_err();
    assert_matches!(err, ModerationError::InvalidTransition { .. });

    session.shutdown().await;
}
