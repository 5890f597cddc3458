//! Session lifecycle.
//!
//! A [`Session`] owns every piece of per-profile state for one signed-in
//! client (or guest) and the background tasks that keep it consistent.
//! It is created at sign-in and torn down with [`Session::shutdown`];
//! nothing in the engine is a process-wide singleton.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use trailpost_core::{ContentItem, ContentType, PendingEntry};
use trailpost_db::DbPool;
use trailpost_events::{
    ConsistencySweep, CrossTabBridge, CrossTabChannel, EventBus, EventSubject, ModerationEvent,
    NotificationCenter, TabId,
};
use trailpost_remote::{ContentApi, HttpRemote, NotificationApi, RemoteError};

use crate::aggregator::FeedAggregator;
use crate::config::{ConfigError, ModerationConfig};
use crate::error::ModerationResult;
use crate::history::ModerationLog;
use crate::processor::ModerationProcessor;
use crate::store::PendingStore;
use crate::triage::{Classifier, HeuristicClassifier, HttpClassifier, TriageClient, TriageError};
use crate::watcher::{FeedSnapshot, FeedWatcher};

/// Actor recorded in history when no user is signed in.
const GUEST_ACTOR: &str = "guest";

/// Errors that prevent a session from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to open local store: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Failed to build remote client: {0}")]
    Remote(#[from] RemoteError),

    #[error("Failed to build classifier: {0}")]
    Triage(#[from] TriageError),

    #[error("Failed to compile heuristic rules: {0}")]
    Rules(#[from] regex::Error),
}

/// Collaborators injected into a session.
pub struct SessionParts {
    pub content_api: Arc<dyn ContentApi>,
    pub notification_api: Arc<dyn NotificationApi>,
    pub classifier: Arc<dyn Classifier>,
    pub pool: DbPool,
    /// Shared with every other session of the same client profile.
    pub channel: CrossTabChannel,
    /// Signed-in user; `None` for a guest.
    pub user_id: Option<String>,
}

pub struct Session {
    config: ModerationConfig,
    tab_id: TabId,
    user_id: Option<String>,
    bus: Arc<EventBus>,
    store: PendingStore,
    triage: TriageClient,
    processor: Arc<ModerationProcessor>,
    aggregator: FeedAggregator,
    notifications: Arc<NotificationCenter>,
    sweep: Arc<ConsistencySweep>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    /// Wire a production session: HTTP remote, file-backed store and the
    /// classifier selected by `triage_url`.
    pub async fn connect(
        config: ModerationConfig,
        channel: CrossTabChannel,
        user_id: Option<String>,
    ) -> Result<Self, StartupError> {
        let pool = trailpost_db::create_pool(&config.database_url).await?;
        trailpost_db::run_migrations(&pool).await?;

        let remote = Arc::new(HttpRemote::new(config.client_config())?);
        let classifier: Arc<dyn Classifier> = match &config.triage_url {
            Some(url) => Arc::new(HttpClassifier::new(url.clone())?),
            None => Arc::new(HeuristicClassifier::new()?),
        };

        Ok(Self::start(
            config,
            SessionParts {
                content_api: remote.clone(),
                notification_api: remote,
                classifier,
                pool,
                channel,
                user_id,
            },
        ))
    }

    /// Build the session state and spawn its background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: ModerationConfig, parts: SessionParts) -> Self {
        let tab_id = TabId::new();
        let bus = Arc::new(EventBus::default());
        let cancel = CancellationToken::new();
        let store = PendingStore::new(parts.pool.clone());

        let triage = TriageClient::new(parts.pool.clone(), parts.classifier);
        let actor = parts.user_id.clone().unwrap_or_else(|| GUEST_ACTOR.to_string());
        let processor = Arc::new(ModerationProcessor::new(
            store.clone(),
            parts.content_api.clone(),
            bus.clone(),
            actor,
        ));
        let aggregator = FeedAggregator::new(store.clone(), parts.content_api, config.stale_after);

        let mut notifications = NotificationCenter::new(parts.pool)
            .with_remote(parts.notification_api)
            .with_retention_days(config.notification_retention_days);
        if let Some(user) = &parts.user_id {
            notifications = notifications.with_recipient(user.clone());
        }
        let notifications = Arc::new(notifications);
        let sweep = Arc::new(ConsistencySweep::new(config.sweep.clone()));

        let mut tasks = Vec::new();
        tasks.push(CrossTabBridge::new(tab_id, bus.clone(), parts.channel).spawn(cancel.clone()));

        let events = bus.subscribe();
        tasks.push(tokio::spawn({
            let center = notifications.clone();
            let cancel = cancel.clone();
            async move { center.run(events, cancel).await }
        }));

        if parts.user_id.is_some() {
            tasks.push(tokio::spawn({
                let center = notifications.clone();
                let cancel = cancel.clone();
                let interval = config.notification_poll_interval;
                async move { center.run_poller(interval, cancel).await }
            }));
        }

        tracing::info!(
            tab_id = %tab_id,
            guest = parts.user_id.is_none(),
            "Moderation session started",
        );

        Self {
            config,
            tab_id,
            user_id: parts.user_id,
            bus,
            store,
            triage,
            processor,
            aggregator,
            notifications,
            sweep,
            cancel,
            tasks,
        }
    }

    /// Watch the session user's feed of one content type.
    pub fn watch_feed(&mut self, content_type: ContentType) -> watch::Receiver<Option<FeedSnapshot>> {
        let watcher = FeedWatcher::new(
            content_type,
            self.user_id.clone(),
            self.aggregator.clone(),
            self.sweep.clone(),
        );
        let snapshots = watcher.snapshots();
        self.tasks
            .push(watcher.spawn(&self.bus, self.cancel.child_token()));
        snapshots
    }

    /// Queue a new draft, start its AI triage and announce it to the author.
    ///
    /// Triage runs in the background; its result never blocks or changes
    /// the draft.
    pub async fn submit_draft(
        &self,
        content_type: ContentType,
        author_name: Option<String>,
        payload: serde_json::Value,
    ) -> ModerationResult<PendingEntry> {
        let author = self.user_id.as_deref().unwrap_or_default();
        let entry = self
            .store
            .create_draft(content_type, author, author_name, payload)
            .await?;
        self.after_submit(&entry);
        Ok(entry)
    }

    /// Resubmit content that was sent back for revision.
    pub async fn resubmit(
        &self,
        item: &ContentItem,
        payload: Option<serde_json::Value>,
    ) -> ModerationResult<PendingEntry> {
        let entry = self.processor.resubmit(item, payload).await?;
        drop(self.triage.analyze(
            entry.item.content_type,
            entry.item.id.clone(),
            entry.item.payload.clone(),
        ));
        Ok(entry)
    }

    fn after_submit(&self, entry: &PendingEntry) {
        drop(self.triage.analyze(
            entry.item.content_type,
            entry.item.id.clone(),
            entry.item.payload.clone(),
        ));
        self.bus.publish(ModerationEvent::ContentPending {
            subject: EventSubject::of(&entry.item),
            show_once: true,
        });
    }

    pub fn config(&self) -> &ModerationConfig {
        &self.config
    }

    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn store(&self) -> &PendingStore {
        &self.store
    }

    pub fn triage(&self) -> &TriageClient {
        &self.triage
    }

    pub fn processor(&self) -> &ModerationProcessor {
        &self.processor
    }

    pub fn log(&self) -> &ModerationLog {
        self.processor.log()
    }

    pub fn aggregator(&self) -> &FeedAggregator {
        &self.aggregator
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    pub fn sweep(&self) -> &ConsistencySweep {
        &self.sweep
    }

    /// Cancel every background task and wait for them to finish.
    pub async fn shutdown(self) {
        tracing::info!(tab_id = %self.tab_id, "Shutting down moderation session");
        self.cancel.cancel();
        for result in futures::future::join_all(self.tasks).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Session task ended abnormally");
            }
        }
    }
}
