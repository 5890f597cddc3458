//! Row structs and their conversions into domain types.
//!
//! Each submodule contains a `FromRow` struct matching the table's
//! columns plus a fallible conversion into the `trailpost-core` type.
//! Values that fail to decode surface as [`sqlx::Error::Decode`].

pub mod ai_decision;
pub mod history;
pub mod notification;
pub mod pending;

use chrono::DateTime;
use trailpost_core::types::Timestamp;

/// Wrap a conversion failure as a decode error.
pub(crate) fn decode_err<E>(err: E) -> sqlx::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    sqlx::Error::Decode(Box::new(err))
}

/// Wrap a serialization failure on the write path.
pub(crate) fn encode_err<E>(err: E) -> sqlx::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    sqlx::Error::Encode(Box::new(err))
}

/// Parse a stored enum column through its `FromStr` impl.
pub(crate) fn parse_column<T>(raw: &str) -> Result<T, sqlx::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>().map_err(decode_err)
}

pub(crate) fn to_millis(ts: Timestamp) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<Timestamp, sqlx::Error> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| sqlx::Error::Decode(format!("timestamp out of range: {ms}").into()))
}
