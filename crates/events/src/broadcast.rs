//! Cross-tab broadcast through a single shared key.
//!
//! Every session of the same client profile holds a clone of one
//! [`CrossTabChannel`]. Posting replaces the value under
//! [`BROADCAST_KEY`] with the serialized last event plus the sender and
//! a timestamp; every other session observes the change. The
//! [`CrossTabBridge`] connects a session's [`EventBus`] to the channel
//! in both directions.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use trailpost_core::types::Timestamp;
use uuid::Uuid;

use crate::bus::{Envelope, EventBus, ModerationEvent, Origin};

/// Name of the shared key holding the last fan-out payload.
pub const BROADCAST_KEY: &str = "last-moderation-event";

/// Identity of one session ("tab") of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(Uuid);

impl TabId {
    pub fn new() -> Self {
        TabId(Uuid::new_v4())
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The value stored under the broadcast key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastRecord {
    pub sender: TabId,
    pub event: ModerationEvent,
    pub timestamp: Timestamp,
}

// ---------------------------------------------------------------------------
// CrossTabChannel
// ---------------------------------------------------------------------------

/// The shared key. Cloning yields another handle to the same key.
///
/// Values are stored serialized, like any other string-valued client
/// storage; readers that cannot decode a value skip it.
#[derive(Clone)]
pub struct CrossTabChannel {
    sender: Arc<watch::Sender<Option<String>>>,
}

impl CrossTabChannel {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Replace the stored payload with `event` from `sender`.
    pub fn post(&self, sender: TabId, event: &ModerationEvent) -> Result<(), serde_json::Error> {
        let record = BroadcastRecord {
            sender,
            event: event.clone(),
            timestamp: Utc::now(),
        };
        let raw = serde_json::to_string(&record)?;
        self.sender.send_replace(Some(raw));
        Ok(())
    }

    /// The last stored payload, decoded.
    pub fn last(&self) -> Option<BroadcastRecord> {
        self.sender
            .borrow()
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }

    /// Observe future changes of the key.
    pub fn watch(&self) -> watch::Receiver<Option<String>> {
        self.sender.subscribe()
    }
}

impl Default for CrossTabChannel {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// CrossTabBridge
// ---------------------------------------------------------------------------

/// Relays events between a session's bus and the shared key.
///
/// Locally-originated events are posted to the key; records posted by
/// other tabs are republished on the local bus with
/// [`Origin::Tab`]. A tab never re-posts relayed events and ignores its
/// own records, so events do not echo.
pub struct CrossTabBridge {
    tab_id: TabId,
    bus: Arc<EventBus>,
    channel: CrossTabChannel,
}

impl CrossTabBridge {
    pub fn new(tab_id: TabId, bus: Arc<EventBus>, channel: CrossTabChannel) -> Self {
        Self {
            tab_id,
            bus,
            channel,
        }
    }

    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    /// Run the relay until `cancel` fires or the bus is closed.
    pub async fn run(&self, cancel: CancellationToken) {
        let (outgoing, incoming) = self.attach();
        self.pump(outgoing, incoming, cancel).await;
    }

    /// Attach to the bus and the key now, then relay on a new task.
    ///
    /// Events published after this returns are relayed even if the task
    /// has not been polled yet.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        let (outgoing, incoming) = self.attach();
        tokio::spawn(async move { self.pump(outgoing, incoming, cancel).await })
    }

    fn attach(&self) -> (broadcast::Receiver<Envelope>, watch::Receiver<Option<String>>) {
        let outgoing = self.bus.subscribe();
        let mut incoming = self.channel.watch();
        // Only changes made after attaching are relayed.
        incoming.mark_unchanged();
        (outgoing, incoming)
    }

    async fn pump(
        &self,
        mut outgoing: broadcast::Receiver<Envelope>,
        mut incoming: watch::Receiver<Option<String>>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(tab_id = %self.tab_id, "Cross-tab bridge cancelled");
                    break;
                }
                received = outgoing.recv() => match received {
                    Ok(envelope) => self.forward(&envelope),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Cross-tab bridge lagged behind the bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = incoming.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let raw = incoming.borrow_and_update().clone();
                    if let Some(raw) = raw {
                        self.relay(&raw);
                    }
                }
            }
        }
    }

    fn forward(&self, envelope: &Envelope) {
        if !envelope.is_local() {
            return;
        }
        if let Err(e) = self.channel.post(self.tab_id, &envelope.event) {
            tracing::warn!(error = %e, "Failed to post event to broadcast key");
        }
    }

    fn relay(&self, raw: &str) {
        let record: BroadcastRecord = match serde_json::from_str(raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, key = BROADCAST_KEY, "Ignoring malformed broadcast payload");
                return;
            }
        };
        if record.sender == self.tab_id {
            return;
        }
        tracing::debug!(
            tab_id = %self.tab_id,
            from = %record.sender,
            topic = record.event.topic(),
            "Relaying event from another tab",
        );
        self.bus.publish_envelope(Envelope {
            event: record.event,
            origin: Origin::Tab(record.sender),
            emitted_at: record.timestamp,
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use trailpost_core::{ContentId, ContentType};

    use super::*;
    use crate::bus::EventSubject;

    fn approved(id: &str) -> ModerationEvent {
        ModerationEvent::ContentApproved {
            subject: EventSubject {
                content_type: ContentType::Post,
                content_id: ContentId::remote(id),
                author_id: Some("u-9".to_string()),
                title: None,
            },
            approved: None,
        }
    }

    #[test]
    fn post_stores_decodable_record() {
        let channel = CrossTabChannel::new();
        let tab = TabId::new();
        channel.post(tab, &approved("1")).unwrap();

        let last = channel.last().expect("record");
        assert_eq!(last.sender, tab);
        assert_eq!(last.event, approved("1"));
    }

    #[tokio::test]
    async fn events_cross_between_tabs_without_echo() {
        let channel = CrossTabChannel::new();
        let bus_a = Arc::new(EventBus::default());
        let bus_b = Arc::new(EventBus::default());
        let bridge_a = CrossTabBridge::new(TabId::new(), bus_a.clone(), channel.clone());
        let bridge_b = CrossTabBridge::new(TabId::new(), bus_b.clone(), channel.clone());
        let tab_a = bridge_a.tab_id();

        let cancel = CancellationToken::new();
        let mut rx_a = bus_a.subscribe();
        let mut rx_b = bus_b.subscribe();
        let a = tokio::spawn({
            let cancel = cancel.clone();
            async move { bridge_a.run(cancel).await }
        });
        let b = tokio::spawn({
            let cancel = cancel.clone();
            async move { bridge_b.run(cancel).await }
        });
        // Let both bridges subscribe before publishing.
        tokio::time::sleep(Duration::from_millis(20)).await;

        bus_a.publish(approved("48213"));

        let relayed = tokio::time::timeout(Duration::from_secs(1), rx_b.recv())
            .await
            .expect("tab B should hear tab A")
            .unwrap();
        assert_eq!(relayed.origin, Origin::Tab(tab_a));
        assert_eq!(relayed.event, approved("48213"));

        // Tab A sees only its own local publish.
        let own = rx_a.recv().await.unwrap();
        assert!(own.is_local());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx_a.try_recv().is_err());

        cancel.cancel();
        a.await.unwrap();
        b.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_payload_is_skipped() {
        let channel = CrossTabChannel::new();
        let bus = Arc::new(EventBus::default());
        let bridge = CrossTabBridge::new(TabId::new(), bus.clone(), channel.clone());
        let mut rx = bus.subscribe();

        let cancel = CancellationToken::new();
        let handle = bridge.spawn(cancel.clone());

        channel.sender.send_replace(Some("{not json".to_string()));
        channel.post(TabId::new(), &approved("7")).unwrap();

        let relayed = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("valid record should still be relayed")
            .unwrap();
        assert_eq!(relayed.event, approved("7"));

        cancel.cancel();
        handle.await.unwrap();
    }
}
