//! Transport abstraction.
//!
//! The core never talks to a socket. Everything goes through one
//! object-safe [`Transport`] trait; concrete HTTP mechanisms plug in from
//! the outside.

use std::time::Duration;

use async_trait::async_trait;
use http::Method;
use url::Url;

use crate::data::FormData;
use crate::fingerprint::AbortSignal;
use crate::response::Response;

/// Credentials policy forwarded to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Credentials {
    Omit,
    #[default]
    SameOrigin,
    Include,
}

/// Request body handed to the transport.
///
/// Multipart encoding is the transport's responsibility; the core only
/// decides which representation applies.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(serde_json::Value),
    Multipart(FormData),
}

/// Fully resolved outgoing request.
#[derive(Debug, Clone)]
pub struct RequestParts {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    pub timeout: Option<Duration>,
    pub credentials: Credentials,
    /// Cooperating transports may observe this to abort mid-transfer. The
    /// client also races the signal externally, so ignoring it is safe.
    pub abort: Option<AbortSignal>,
}

/// Classified transport failure.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The server produced an error-status response.
    #[error("HTTP error response ({})", .0.status)]
    Response(Response),

    /// The request was aborted.
    #[error("request cancelled")]
    Cancelled,

    /// The request exceeded its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection-level failure with no server response.
    #[error("network error: {0}")]
    Network(String),
}

/// One operation: send a request, receive a classified outcome.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: RequestParts) -> Result<Response, TransportError>;
}
