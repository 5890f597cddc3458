//! Keeps an author feed fresh as moderation events arrive.
//!
//! Local approvals of the watched type start a consistency sweep: the
//! feed is re-queried until the persisted record shows up or the policy
//! runs out, in which case the feed is reloaded anyway. Events relayed
//! from other tabs only trigger a reload; nothing here mutates content.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use trailpost_core::types::Timestamp;
use trailpost_core::{ContentId, ContentStatus, ContentType};
use trailpost_events::{ConsistencySweep, Envelope, EventBus, ModerationEvent, SweepOutcome};

use crate::aggregator::{FeedAggregator, FeedPage};
use crate::error::ModerationResult;

/// Items kept in a watched feed snapshot.
pub const SNAPSHOT_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct FeedSnapshot {
    pub page: FeedPage,
    pub refreshed_at: Timestamp,
}

pub struct FeedWatcher {
    content_type: ContentType,
    author_id: Option<String>,
    aggregator: FeedAggregator,
    sweep: Arc<ConsistencySweep>,
    snapshots: watch::Sender<Option<FeedSnapshot>>,
}

impl FeedWatcher {
    pub fn new(
        content_type: ContentType,
        author_id: Option<String>,
        aggregator: FeedAggregator,
        sweep: Arc<ConsistencySweep>,
    ) -> Self {
        let (snapshots, _) = watch::channel(None);
        Self {
            content_type,
            author_id,
            aggregator,
            sweep,
            snapshots,
        }
    }

    /// Receive every refreshed snapshot. `None` until the first load.
    pub fn snapshots(&self) -> watch::Receiver<Option<FeedSnapshot>> {
        self.snapshots.subscribe()
    }

    /// Reload the feed and publish the snapshot.
    pub async fn refresh(&self) -> ModerationResult<FeedSnapshot> {
        let page = self.load().await?;
        Ok(self.publish(page))
    }

    /// Subscribe to `bus` now, then watch it on a new task.
    pub fn spawn(self, bus: &EventBus, cancel: CancellationToken) -> JoinHandle<()> {
        let events = bus.subscribe();
        tokio::spawn(async move { self.run(events, cancel).await })
    }

    pub async fn run(&self, mut events: broadcast::Receiver<Envelope>, cancel: CancellationToken) {
        if let Err(e) = self.refresh().await {
            tracing::warn!(content_type = %self.content_type, error = %e, "Initial feed load failed");
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(content_type = %self.content_type, "Feed watcher cancelled");
                    break;
                }
                received = events.recv() => match received {
                    Ok(envelope) => {
                        if !self.handle(&envelope, &cancel).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Feed watcher lagged, reloading");
                        self.reload().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    /// React to one event. Returns `false` once cancelled mid-sweep.
    async fn handle(&self, envelope: &Envelope, cancel: &CancellationToken) -> bool {
        let subject = envelope.event.subject();
        if subject.content_type != self.content_type {
            return true;
        }

        if !envelope.is_local() {
            tracing::debug!(
                content_id = %subject.content_id,
                topic = envelope.event.topic(),
                "Event from another tab, reloading feed",
            );
            self.reload().await;
            return true;
        }

        match &envelope.event {
            ModerationEvent::ContentApproved { subject, approved } => {
                let expected = approved
                    .as_ref()
                    .map(|item| item.id.clone())
                    .unwrap_or_else(|| subject.content_id.clone());
                self.await_visible(expected, cancel).await
            }
            _ => {
                self.reload().await;
                true
            }
        }
    }

    /// Re-query until `expected` is visible and active.
    async fn await_visible(&self, expected: ContentId, cancel: &CancellationToken) -> bool {
        let label = format!("{}:{}", self.content_type, expected);
        let outcome = self
            .sweep
            .run(
                &label,
                |_attempt| {
                    let expected = expected.clone();
                    async move {
                        let mut page = self.load_all().await?;
                        let visible = page.items.iter().any(|f| {
                            f.item.id == expected
                                && f.item.effective_status() == ContentStatus::Active
                        });
                        if visible {
                            page.items.truncate(SNAPSHOT_LIMIT);
                            self.publish(page);
                        }
                        Ok::<bool, crate::error::ModerationError>(visible)
                    }
                },
                cancel,
            )
            .await;

        match outcome {
            SweepOutcome::Observed { .. } => true,
            SweepOutcome::Missed { .. } => {
                self.reload().await;
                true
            }
            SweepOutcome::Cancelled => false,
        }
    }

    async fn reload(&self) {
        if let Err(e) = self.refresh().await {
            tracing::debug!(content_type = %self.content_type, error = %e, "Feed reload failed");
        }
    }

    async fn load(&self) -> ModerationResult<FeedPage> {
        self.aggregator
            .list_for_author_feed(self.content_type, self.author_id.as_deref(), SNAPSHOT_LIMIT, 0)
            .await
    }

    /// The whole feed, so an older record past the snapshot window
    /// still counts as visible.
    async fn load_all(&self) -> ModerationResult<FeedPage> {
        self.aggregator
            .list_for_author_feed(self.content_type, self.author_id.as_deref(), usize::MAX, 0)
            .await
    }

    fn publish(&self, page: FeedPage) -> FeedSnapshot {
        let snapshot = FeedSnapshot {
            page,
            refreshed_at: Utc::now(),
        };
        self.snapshots.send_replace(Some(snapshot.clone()));
        snapshot
    }
}
