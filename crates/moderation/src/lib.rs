//! Trailpost moderation engine.
//!
//! Decides what state user content is in, reconciles the local pending
//! queue with the authoritative remote store, attaches advisory AI
//! triage, and fans status changes out to every surface of a session.
//!
//! Start with [`Session`]: it wires the [`PendingStore`],
//! [`TriageClient`], [`ModerationProcessor`], [`FeedAggregator`] and the
//! notification center for one client profile.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod history;
pub mod processor;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod triage;
pub mod watcher;

pub use aggregator::{merge_by_id, BadgeCounts, FeedAggregator, FeedItem, FeedPage};
pub use config::{ConfigError, ModerationConfig};
pub use error::{ModerationError, ModerationResult};
pub use history::ModerationLog;
pub use processor::ModerationProcessor;
pub use session::{Session, SessionParts, StartupError};
pub use store::PendingStore;
pub use triage::{Classifier, HeuristicClassifier, HttpClassifier, TriageClient, TriageError};
pub use watcher::{FeedSnapshot, FeedWatcher};
