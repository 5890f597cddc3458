use trailpost_core::{ContentId, ContentStatus, CoreError};
use trailpost_remote::RemoteError;

/// Errors surfaced by moderation operations.
///
/// `Validation` and `PersistenceFailure` must be shown to the acting
/// moderator; nothing here is retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    /// Missing reason or payload fields. Nothing was sent to the server.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid transition from '{from}' to '{to}'")]
    InvalidTransition {
        from: ContentStatus,
        to: ContentStatus,
    },

    /// The server accepted the request but did not return a persisted
    /// record. The pending entry is kept so the action can be retried.
    #[error("Server did not confirm a persisted record for {id}")]
    PersistenceFailure { id: ContentId },

    /// The remote store could not be reached or refused the request.
    #[error("Remote store error: {0}")]
    Transport(#[source] RemoteError),

    /// The remote record was not found. This may be replica lag rather
    /// than absence, so nothing is created automatically; use
    /// `approve_as_new` to create it from the cached payload.
    #[error("Remote record {id} not found; explicit reconciliation required")]
    AmbiguousNotFound { id: ContentId },

    /// Another action on the same content is still in flight.
    #[error("An action on {id} is already in progress")]
    InFlight { id: ContentId },

    #[error("Local store error: {0}")]
    Store(#[from] sqlx::Error),
}

pub type ModerationResult<T> = Result<T, ModerationError>;

impl From<CoreError> for ModerationError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidTransition { from, to } => {
                ModerationError::InvalidTransition { from, to }
            }
            other => ModerationError::Validation(other.to_string()),
        }
    }
}
