//! Hunter error types.

use kubehunt_events::EventKind;
use thiserror::Error;

/// Errors that can occur while hunting.
#[derive(Debug, Error)]
pub enum HuntError {
    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(String),

    /// The credential cannot be sent as a header.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// The request never produced a response (connect, TLS, timeout).
    #[error("transport failure for {url}: {message}")]
    Transport {
        /// Request URL.
        url: String,
        /// Underlying error message.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status {
        /// Request URL.
        url: String,
        /// Status code.
        status: u16,
    },

    /// The response body could not be decoded.
    #[error("could not decode response from {url}: {message}")]
    Decode {
        /// Request URL.
        url: String,
        /// Decoder error message.
        message: String,
    },

    /// A hunter was built from an event it does not handle.
    #[error("expected a {expected} event, got {actual}")]
    UnexpectedTrigger {
        /// Kind the hunter requires.
        expected: EventKind,
        /// Kind it was given.
        actual: EventKind,
    },

    /// A namespace created during active hunting could not be removed.
    #[error("failed to delete namespace {namespace}: {reason}")]
    Cleanup {
        /// Namespace left behind.
        namespace: String,
        /// Why deletion failed.
        reason: String,
    },
}

impl HuntError {
    /// Whether this is a transport or status failure, which probes treat as
    /// "nothing found".
    #[must_use]
    pub fn is_probe_miss(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Status { .. })
    }
}

/// Result type for hunter operations.
pub type HuntResult<T> = Result<T, HuntError>;
