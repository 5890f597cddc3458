/// Errors from the remote store boundary.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// The request did not complete within the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// The record addressed by the request does not exist (HTTP 404).
    ///
    /// Callers must not read this as authoritative absence; a lagging
    /// replica answers the same way.
    #[error("Remote record not found: {0}")]
    NotFound(String),

    /// The remote store returned a non-2xx status code.
    #[error("Remote API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A response body could not be decoded into the expected shape.
    #[error("Malformed response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Request(err)
        }
    }
}

impl RemoteError {
    /// Whether the failure is a transport problem rather than an answer
    /// from the server.
    pub fn is_transport(&self) -> bool {
        matches!(self, RemoteError::Request(_) | RemoteError::Timeout)
    }
}
