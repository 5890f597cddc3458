//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`ModerationEvent`]s.
//! It is shared via `Arc<EventBus>` across the session. Every event is
//! wrapped in an [`Envelope`] that records where it came from, so the
//! cross-tab bridge can tell locally-originated events from ones it
//! relayed itself.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use trailpost_core::types::Timestamp;
use trailpost_core::{ContentId, ContentItem, ContentStatus, ContentType};

use crate::broadcast::TabId;

// ---------------------------------------------------------------------------
// ModerationEvent
// ---------------------------------------------------------------------------

/// The content an event is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSubject {
    pub content_type: ContentType,
    pub content_id: ContentId,
    /// `None` for guest-created content.
    pub author_id: Option<String>,
    /// Display title, if known.
    pub title: Option<String>,
}

impl EventSubject {
    /// Describe `item` as an event subject.
    pub fn of(item: &ContentItem) -> Self {
        Self {
            content_type: item.content_type,
            content_id: item.id.clone(),
            author_id: Some(item.author_id.clone()).filter(|a| !a.is_empty()),
            title: item.title(),
        }
    }
}

/// A status change, one variant per topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "kebab-case")]
pub enum ModerationEvent {
    /// Content became `active`. `approved` carries the persisted record.
    ContentApproved {
        subject: EventSubject,
        approved: Option<ContentItem>,
    },
    ContentRejected {
        subject: EventSubject,
        reason: Option<String>,
    },
    ContentRevision {
        subject: EventSubject,
        reason: Option<String>,
    },
    /// Content entered the queue. `show_once` asks the author's surfaces
    /// to tell them it is awaiting moderation.
    ContentPending {
        subject: EventSubject,
        #[serde(default)]
        show_once: bool,
    },
    ContentHidden {
        subject: EventSubject,
        reason: Option<String>,
    },
}

impl ModerationEvent {
    pub fn subject(&self) -> &EventSubject {
        match self {
            ModerationEvent::ContentApproved { subject, .. }
            | ModerationEvent::ContentRejected { subject, .. }
            | ModerationEvent::ContentRevision { subject, .. }
            | ModerationEvent::ContentPending { subject, .. }
            | ModerationEvent::ContentHidden { subject, .. } => subject,
        }
    }

    /// The status the content moved to.
    pub fn status(&self) -> ContentStatus {
        match self {
            ModerationEvent::ContentApproved { .. } => ContentStatus::Active,
            ModerationEvent::ContentRejected { .. } => ContentStatus::Rejected,
            ModerationEvent::ContentRevision { .. } => ContentStatus::Revision,
            ModerationEvent::ContentPending { .. } => ContentStatus::Pending,
            ModerationEvent::ContentHidden { .. } => ContentStatus::Hidden,
        }
    }

    /// Topic name, e.g. `"content-approved"`.
    pub fn topic(&self) -> &'static str {
        match self {
            ModerationEvent::ContentApproved { .. } => "content-approved",
            ModerationEvent::ContentRejected { .. } => "content-rejected",
            ModerationEvent::ContentRevision { .. } => "content-revision",
            ModerationEvent::ContentPending { .. } => "content-pending",
            ModerationEvent::ContentHidden { .. } => "content-hidden",
        }
    }

    /// Moderator-supplied reason, for the variants that carry one.
    pub fn reason(&self) -> Option<&str> {
        match self {
            ModerationEvent::ContentRejected { reason, .. }
            | ModerationEvent::ContentRevision { reason, .. }
            | ModerationEvent::ContentHidden { reason, .. } => reason.as_deref(),
            ModerationEvent::ContentApproved { .. } | ModerationEvent::ContentPending { .. } => {
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Where an event entered this session's bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "tab", rename_all = "lowercase")]
pub enum Origin {
    /// Published by this session.
    Local,
    /// Relayed from another session through the broadcast key.
    Tab(TabId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: ModerationEvent,
    pub origin: Origin,
    pub emitted_at: Timestamp,
}

impl Envelope {
    pub fn local(event: ModerationEvent) -> Self {
        Self {
            event,
            origin: Origin::Local,
            emitted_at: Utc::now(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.origin == Origin::Local
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`Envelope`].
///
/// ```rust
/// use trailpost_events::bus::EventBus;
///
/// let bus = EventBus::default();
/// let _rx = bus.subscribe();
/// assert_eq!(bus.subscriber_count(), 1);
/// ```
pub struct EventBus {
    sender: broadcast::Sender<Envelope>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event originating in this session.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: ModerationEvent) {
        tracing::debug!(
            topic = event.topic(),
            content_id = %event.subject().content_id,
            "Publishing moderation event",
        );
        self.publish_envelope(Envelope::local(event));
    }

    /// Publish a pre-built envelope, e.g. one relayed from another tab.
    pub fn publish_envelope(&self, envelope: Envelope) {
        // A send error only means there are zero receivers.
        let _ = self.sender.send(envelope);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
