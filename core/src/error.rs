//! Error types for the access layer.
//!
//! # Design
//! One enum covers the whole request lifecycle so callers can match on the
//! stage that failed: handle construction, URL validation, the network
//! exchange, body parsing, or use of a closed handle. Only a failed release
//! after a successful parse is downgraded to a log line; every other failure
//! reaches the caller.

use std::error::Error as StdError;

/// Boxed cause carried by transport and parse failures.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors returned by the requester, the request builders, and the parser.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The connection handle could not be created (transport or TLS init).
    #[error("connection setup failed: {0}")]
    ConnectionSetup(String),

    /// The input URL is not an absolute `http`/`https` URL. No I/O was done.
    #[error("malformed url {url:?}: {reason}")]
    MalformedUrl { url: String, reason: String },

    /// The network exchange failed.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// The response body could not be read or is not valid JSON.
    #[error("failed to parse response body: {0}")]
    ResponseParse(#[source] BoxError),

    /// The requester was closed before or during the call.
    #[error("connection handle is closed")]
    ClosedHandle,

    /// A request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ApiError {
    pub(crate) fn malformed_url(url: &str, reason: impl ToString) -> Self {
        ApiError::MalformedUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn transport(err: impl Into<BoxError>) -> Self {
        ApiError::Transport(err.into())
    }

    pub(crate) fn response_parse(err: impl Into<BoxError>) -> Self {
        ApiError::ResponseParse(err.into())
    }
}
