//! Client boundary to the authoritative remote store.
//!
//! The engine talks to the remote content and notification endpoints
//! only through the [`ContentApi`] and [`NotificationApi`] traits;
//! [`HttpRemote`] is the `reqwest` implementation used in production.

pub mod api;
pub mod error;
pub mod http;
pub mod messages;

pub use api::{ContentApi, ListQuery, NotificationApi, Page};
pub use error::RemoteError;
pub use http::{ClientConfig, HttpRemote};
