//! Error types for the augur crate.

use std::time::Duration;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while coordinating precognitive requests.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The server response lacked the `Precognition: true` marker header.
    ///
    /// This is a protocol violation: the route is not wired up for
    /// precognitive handling. Fatal to the current request, never retried.
    #[error("Did not receive a Precognition response. Ensure the server is configured to handle Precognition requests.")]
    MissingPrecognitionHeader,

    /// The request was cancelled, either by a newer request superseding it
    /// on the same fingerprint or by a caller-supplied abort signal.
    #[error("Request cancelled")]
    Cancelled,

    /// The request exceeded its deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Transport-level failure that did not originate from a server response.
    #[error("Network error: {0}")]
    Network(String),

    /// Error-status response with no registered handler.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// A file value appeared in a payload position that requires JSON or
    /// query-string encoding.
    #[error("File value cannot be encoded at `{0}`")]
    FileInPayload(String),

    /// Failure raised from a caller-supplied hook.
    #[error("Hook error: {0}")]
    Hook(String),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Create an unhandled-status error.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Create a hook error.
    pub fn hook(message: impl Into<String>) -> Self {
        Self::Hook(message.into())
    }

    /// True for cancellation errors (supersession or explicit abort).
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// True for the expected "validation failed" rejection (HTTP 422).
    pub fn is_validation_rejection(&self) -> bool {
        matches!(self, Self::Status { status: 422, .. })
    }
}
