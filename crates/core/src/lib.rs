//! Domain model for the trailpost moderation engine.
//!
//! Everything in this crate is pure data and validation: content
//! identity and lifecycle, advisory AI annotations, notification and
//! moderation-history records. I/O lives in the `db`, `remote` and
//! `events` crates.

pub mod ai;
pub mod content;
pub mod error;
pub mod history;
pub mod notification;
pub mod payload;
pub mod pending;
pub mod types;

pub use content::{ContentId, ContentItem, ContentStatus, ContentType};
pub use error::CoreError;
pub use pending::PendingEntry;
