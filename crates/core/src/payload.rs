//! Type-specific payload validation for new drafts.
//!
//! The moderation engine treats payloads as opaque JSON, but a draft
//! must carry the fields its content type cannot be rendered without.
//! Each content type has a typed view that is deserialized from the
//! payload and checked with `validator`.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use validator::Validate;

use crate::content::ContentType;
use crate::error::CoreError;

/// Maximum length of any title field (characters).
pub const MAX_TITLE_LENGTH: u64 = 200;

/// Maximum length of a post body (characters).
pub const MAX_BODY_LENGTH: u64 = 20_000;

/// Maximum length of a comment (characters).
pub const MAX_COMMENT_LENGTH: u64 = 5_000;

#[derive(Debug, Deserialize, Validate)]
struct PostPayload {
    #[validate(length(max = MAX_TITLE_LENGTH))]
    title: Option<String>,
    #[serde(alias = "text")]
    #[validate(length(min = 1, max = MAX_BODY_LENGTH))]
    body: String,
}

#[derive(Debug, Deserialize, Validate)]
struct MarkerPayload {
    #[validate(length(min = 1, max = MAX_TITLE_LENGTH))]
    title: String,
    #[validate(range(min = -90.0, max = 90.0))]
    latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    longitude: f64,
}

#[derive(Debug, Deserialize, Validate)]
struct EventPayload {
    #[validate(length(min = 1, max = MAX_TITLE_LENGTH))]
    title: String,
    #[serde(alias = "start_date")]
    #[validate(length(min = 1))]
    date: String,
}

#[derive(Debug, Deserialize, Validate)]
struct RoutePayload {
    #[validate(length(min = 1, max = MAX_TITLE_LENGTH))]
    title: String,
}

#[derive(Debug, Deserialize, Validate)]
struct CommentPayload {
    #[serde(alias = "content")]
    #[validate(length(min = 1, max = MAX_COMMENT_LENGTH))]
    text: String,
}

/// Validate that `payload` carries the required fields for `content_type`.
pub fn validate_payload(
    content_type: ContentType,
    payload: &serde_json::Value,
) -> Result<(), CoreError> {
    if !payload.is_object() {
        return Err(CoreError::Validation(format!(
            "{content_type} payload must be a JSON object"
        )));
    }

    let required_text = match content_type {
        ContentType::Post => check::<PostPayload>(payload)?.body,
        ContentType::Marker => check::<MarkerPayload>(payload)?.title,
        ContentType::Event => check::<EventPayload>(payload)?.title,
        ContentType::Route => check::<RoutePayload>(payload)?.title,
        ContentType::Comment => check::<CommentPayload>(payload)?.text,
    };

    if required_text.trim().is_empty() {
        return Err(CoreError::Validation(format!(
            "{content_type} payload must not be blank"
        )));
    }
    Ok(())
}

fn check<T: DeserializeOwned + Validate>(payload: &serde_json::Value) -> Result<T, CoreError> {
    let typed: T = serde_json::from_value(payload.clone())
        .map_err(|e| CoreError::Validation(format!("Invalid payload: {e}")))?;
    typed
        .validate()
        .map_err(|e| CoreError::Validation(e.to_string()))?;
    Ok(typed)
}
