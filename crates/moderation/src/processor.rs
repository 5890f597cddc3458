//! Applies moderation decisions.
//!
//! Every action validates the transition, talks to the remote store when
//! the item exists there, and on success removes the pending entry,
//! appends to the moderation history and publishes a bus event. Actions
//! on the same content are serialized by an in-flight set: a second call
//! while the first is running fails with `InFlight`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use trailpost_core::content::validate_transition;
use trailpost_core::history::{ModerationAction, NewHistoryRecord};
use trailpost_core::payload::validate_payload;
use trailpost_core::{ContentId, ContentItem, ContentStatus, ContentType, PendingEntry};
use trailpost_db::repositories::ReconciliationRepo;
use trailpost_events::{EventBus, EventSubject, ModerationEvent};
use trailpost_remote::{ContentApi, RemoteError};

use crate::error::{ModerationError, ModerationResult};
use crate::history::ModerationLog;
use crate::store::PendingStore;

type InFlightKey = (ContentType, ContentId);

/// Releases an in-flight key when the action finishes, including on error.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<InFlightKey>>,
    key: InFlightKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.key);
    }
}

/// Outcome of one transition, before its side effects are applied.
struct Applied {
    action: ModerationAction,
    content_type: ContentType,
    content_id: ContentId,
    resulting_id: Option<ContentId>,
    from: ContentStatus,
    to: ContentStatus,
    reason: Option<String>,
    /// Remove the pending entry for `content_id`.
    drop_entry: bool,
    event: ModerationEvent,
}

pub struct ModerationProcessor {
    store: PendingStore,
    api: Arc<dyn ContentApi>,
    bus: Arc<EventBus>,
    log: ModerationLog,
    actor_id: String,
    in_flight: Mutex<HashSet<InFlightKey>>,
}

impl ModerationProcessor {
    pub fn new(
        store: PendingStore,
        api: Arc<dyn ContentApi>,
        bus: Arc<EventBus>,
        actor_id: impl Into<String>,
    ) -> Self {
        let log = ModerationLog::new(store.pool().clone());
        Self {
            store,
            api,
            bus,
            log,
            actor_id: actor_id.into(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn log(&self) -> &ModerationLog {
        &self.log
    }

    /// Whether an action on this content is currently running.
    pub fn is_processing(&self, content_type: ContentType, id: &ContentId) -> bool {
        let set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.contains(&(content_type, id.clone()))
    }

    /// Publish an item.
    ///
    /// Remote items are approved in place. Local drafts are created on
    /// the server in `active` state and the local id is reconciled to
    /// the persisted one. Approving an already active item, or a local
    /// draft that was already reconciled, returns the existing record.
    pub async fn approve(&self, item: &ContentItem) -> ModerationResult<ContentItem> {
        let _guard = self.begin(item)?;

        if item.status == Some(ContentStatus::Active) {
            tracing::debug!(content_id = %item.id, "Approve on active content is a no-op");
            return Ok(item.clone());
        }

        match &item.id {
            ContentId::Local(local_id) => {
                let pool = self.store.pool();
                if let Some(existing) =
                    ReconciliationRepo::find(pool, item.content_type, local_id).await?
                {
                    tracing::debug!(
                        content_id = %item.id,
                        persisted_id = %existing.id,
                        "Draft already reconciled, returning persisted record",
                    );
                    self.store.remove(item.content_type, &item.id).await?;
                    return Ok(existing);
                }
                validate_transition(item.effective_status(), ContentStatus::Active)?;

                let persisted = self
                    .api
                    .approve_local(item)
                    .await
                    .map_err(ModerationError::Transport)?;
                let persisted = self.require_persisted(item, persisted)?;
                self.reconcile(item, &persisted).await;
                self.finish(approved(item, &persisted, Some(persisted.id.clone())))
                    .await;
                Ok(persisted)
            }
            ContentId::Remote(remote_id) => {
                validate_transition(item.effective_status(), ContentStatus::Active)?;

                let persisted = self
                    .api
                    .approve(item.content_type, remote_id)
                    .await
                    .map_err(|e| match e {
                        RemoteError::NotFound(_) => ModerationError::AmbiguousNotFound {
                            id: item.id.clone(),
                        },
                        other => ModerationError::Transport(other),
                    })?;
                let persisted = self.require_persisted(item, persisted)?;
                self.finish(approved(item, &persisted, None)).await;
                Ok(persisted)
            }
        }
    }

    /// Create a server record from the cached payload of an item whose
    /// remote approve came back not-found.
    ///
    /// This is the explicit reconciliation step for `AmbiguousNotFound`;
    /// it is never taken automatically.
    pub async fn approve_as_new(&self, item: &ContentItem) -> ModerationResult<ContentItem> {
        let _guard = self.begin(item)?;
        validate_transition(item.effective_status(), ContentStatus::Active)?;

        tracing::info!(content_id = %item.id, "Recreating content from cached payload");
        let persisted = self
            .api
            .approve_local(item)
            .await
            .map_err(ModerationError::Transport)?;
        let persisted = self.require_persisted(item, persisted)?;
        self.reconcile(item, &persisted).await;
        self.finish(approved(item, &persisted, Some(persisted.id.clone())))
            .await;
        Ok(persisted)
    }

    /// Reject with a mandatory, non-blank reason.
    ///
    /// Local drafts were never published; their entry is simply dropped.
    pub async fn reject(
        &self,
        item: &ContentItem,
        reason: Option<&str>,
    ) -> ModerationResult<ContentItem> {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| ModerationError::Validation("A rejection reason is required".into()))?;

        let _guard = self.begin(item)?;
        let mut updated = item.clone();
        updated.transition(ContentStatus::Rejected, Some(reason.to_string()))?;

        if let ContentId::Remote(remote_id) = &item.id {
            self.api
                .reject(item.content_type, remote_id, reason)
                .await
                .map_err(ModerationError::Transport)?;
        }

        self.finish(Applied {
            action: ModerationAction::Reject,
            content_type: item.content_type,
            content_id: item.id.clone(),
            resulting_id: None,
            from: item.effective_status(),
            to: ContentStatus::Rejected,
            reason: Some(reason.to_string()),
            drop_entry: true,
            event: ModerationEvent::ContentRejected {
                subject: EventSubject::of(item),
                reason: Some(reason.to_string()),
            },
        })
        .await;
        Ok(updated)
    }

    /// Send content back to its author. Local drafts keep their id and
    /// their entry, rewritten to `revision`.
    pub async fn request_revision(
        &self,
        item: &ContentItem,
        reason: Option<&str>,
    ) -> ModerationResult<ContentItem> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty()).map(String::from);
        let _guard = self.begin(item)?;

        let updated = match &item.id {
            ContentId::Remote(remote_id) => {
                let mut updated = item.clone();
                updated.transition(ContentStatus::Revision, reason.clone())?;
                self.api
                    .request_revision(item.content_type, remote_id, reason.as_deref())
                    .await
                    .map_err(ModerationError::Transport)?;
                updated
            }
            ContentId::Local(_) => {
                validate_transition(item.effective_status(), ContentStatus::Revision)?;
                match self
                    .store
                    .mark_revision(item.content_type, &item.id, reason.clone())
                    .await
                {
                    Ok(entry) => entry.item,
                    // Not queued on this profile: nothing to rewrite.
                    Err(ModerationError::Validation(_)) => {
                        let mut updated = item.clone();
                        updated.transition(ContentStatus::Revision, reason.clone())?;
                        updated
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        self.finish(Applied {
            action: ModerationAction::RequestRevision,
            content_type: item.content_type,
            content_id: item.id.clone(),
            resulting_id: None,
            from: item.effective_status(),
            to: ContentStatus::Revision,
            reason: reason.clone(),
            drop_entry: item.id.is_remote(),
            event: ModerationEvent::ContentRevision {
                subject: EventSubject::of(item),
                reason,
            },
        })
        .await;
        Ok(updated)
    }

    /// Take published content down.
    pub async fn hide(
        &self,
        item: &ContentItem,
        reason: Option<&str>,
    ) -> ModerationResult<ContentItem> {
        let ContentId::Remote(remote_id) = &item.id else {
            return Err(ModerationError::Validation(
                "Only published content can be hidden".into(),
            ));
        };
        let reason = reason.map(str::trim).filter(|r| !r.is_empty()).map(String::from);
        let _guard = self.begin(item)?;

        let mut updated = item.clone();
        updated.transition(ContentStatus::Hidden, reason.clone())?;
        self.api
            .hide(item.content_type, remote_id, reason.as_deref())
            .await
            .map_err(ModerationError::Transport)?;

        self.finish(Applied {
            action: ModerationAction::Hide,
            content_type: item.content_type,
            content_id: item.id.clone(),
            resulting_id: None,
            from: item.effective_status(),
            to: ContentStatus::Hidden,
            reason: reason.clone(),
            drop_entry: false,
            event: ModerationEvent::ContentHidden {
                subject: EventSubject::of(item),
                reason,
            },
        })
        .await;
        Ok(updated)
    }

    /// Resubmit content that was sent back for revision.
    ///
    /// The resubmission is a new pending entry with a fresh local id; the
    /// history record links it to its predecessor. `payload` replaces the
    /// cached one when given.
    pub async fn resubmit(
        &self,
        item: &ContentItem,
        payload: Option<serde_json::Value>,
    ) -> ModerationResult<PendingEntry> {
        let _guard = self.begin(item)?;
        validate_transition(item.effective_status(), ContentStatus::Pending)?;

        let payload = payload.unwrap_or_else(|| item.payload.clone());
        validate_payload(item.content_type, &payload)?;

        let mut fresh = ContentItem::new_local(
            item.content_type,
            item.author_id.clone(),
            item.author_name.clone(),
            payload,
        );
        fresh.status = Some(ContentStatus::Pending);
        let entry = PendingEntry::new(fresh);
        self.store.put(&entry).await?;

        self.finish(Applied {
            action: ModerationAction::Resubmit,
            content_type: item.content_type,
            content_id: item.id.clone(),
            resulting_id: Some(entry.item.id.clone()),
            from: ContentStatus::Revision,
            to: ContentStatus::Pending,
            reason: None,
            drop_entry: true,
            event: ModerationEvent::ContentPending {
                subject: EventSubject::of(&entry.item),
                show_once: true,
            },
        })
        .await;
        Ok(entry)
    }

    fn begin(&self, item: &ContentItem) -> ModerationResult<InFlightGuard<'_>> {
        let key = (item.content_type, item.id.clone());
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(key.clone()) {
            return Err(ModerationError::InFlight {
                id: item.id.clone(),
            });
        }
        Ok(InFlightGuard {
            set: &self.in_flight,
            key,
        })
    }

    fn require_persisted(
        &self,
        item: &ContentItem,
        persisted: Option<ContentItem>,
    ) -> ModerationResult<ContentItem> {
        match persisted {
            Some(mut record) => {
                if record.status.is_none() {
                    record.status = Some(ContentStatus::Active);
                }
                Ok(record)
            }
            None => {
                tracing::error!(
                    content_type = %item.content_type,
                    content_id = %item.id,
                    "Approve returned no persisted record, keeping pending entry",
                );
                Err(ModerationError::PersistenceFailure {
                    id: item.id.clone(),
                })
            }
        }
    }

    /// Record the local-to-persisted mapping and drop the draft's entry.
    async fn reconcile(&self, item: &ContentItem, persisted: &ContentItem) {
        if let Err(e) = ReconciliationRepo::reconcile(
            self.store.pool(),
            item.content_type,
            item.id.as_str(),
            persisted,
        )
        .await
        {
            tracing::error!(
                content_id = %item.id,
                persisted_id = %persisted.id,
                error = %e,
                "Failed to record reconciliation",
            );
        }
    }

    /// Apply the local side effects of a committed transition.
    ///
    /// The remote store already holds the new state, so local failures
    /// are logged rather than reported as a failed action.
    async fn finish(&self, applied: Applied) {
        if applied.drop_entry {
            if let Err(e) = self
                .store
                .remove(applied.content_type, &applied.content_id)
                .await
            {
                tracing::error!(
                    content_id = %applied.content_id,
                    error = %e,
                    "Failed to remove pending entry",
                );
            }
        }

        let record = NewHistoryRecord {
            content_type: applied.content_type,
            content_id: applied.content_id.clone(),
            resulting_id: applied.resulting_id,
            action: applied.action,
            reason: applied.reason,
            actor_id: self.actor_id.clone(),
            from_status: applied.from,
            to_status: applied.to,
        };
        if let Err(e) = self.log.append(&record).await {
            tracing::error!(
                content_id = %applied.content_id,
                error = %e,
                "Failed to append moderation history",
            );
        }

        tracing::info!(
            content_type = %applied.content_type,
            content_id = %applied.content_id,
            action = %applied.action,
            from = %applied.from,
            to = %applied.to,
            "Moderation action applied",
        );
        self.bus.publish(applied.event);
    }
}

/// The approval event carries the persisted id and record; author and
/// title fall back to the draft's when the server omits them.
fn approved(item: &ContentItem, persisted: &ContentItem, resulting_id: Option<ContentId>) -> Applied {
    let mut subject = EventSubject::of(persisted);
    if subject.author_id.is_none() && !item.author_id.is_empty() {
        subject.author_id = Some(item.author_id.clone());
    }
    if subject.title.is_none() {
        subject.title = item.title();
    }

    Applied {
        action: ModerationAction::Approve,
        content_type: item.content_type,
        content_id: item.id.clone(),
        resulting_id,
        from: item.effective_status(),
        to: ContentStatus::Active,
        reason: None,
        drop_entry: true,
        event: ModerationEvent::ContentApproved {
            subject,
            approved: Some(persisted.clone()),
        },
    }
}
