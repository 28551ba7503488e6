//! # Augur
//!
//! Client-side precognitive request and validation engine.
//!
//! Augur lets a form issue speculative, server-validated HTTP requests
//! ahead of final submission and reconciles the resulting per-field
//! validation errors into observable state:
//!
//! - [`Client`] dispatches requests through a pluggable [`Transport`],
//!   deduplicates in-flight requests by fingerprint, and classifies
//!   outcomes by status into named handler slots.
//! - [`Validator`] debounces field-level validation triggers, tracks
//!   touched/validated/error sets, and notifies subscribers on change.
//! - [`normalize`] converts between the two accepted error shapes.

pub mod client;
pub mod data;
pub mod debounce;
pub mod error;
pub mod fingerprint;
pub mod normalize;
pub mod response;
pub mod transport;
pub mod validator;

// Re-exports
pub use client::{with_validation_scope, Client, ClientBuilder, Handler, RequestConfig};
pub use data::{FileMeta, FormData, FormValue};
pub use error::{Error, Result};
pub use fingerprint::{abort_pair, AbortHandle, AbortRegistry, AbortSignal, Fingerprint};
pub use normalize::{FieldMessages, SimpleErrors, StructuredErrors};
pub use response::{
    Response, PRECOGNITION_HEADER, PRECOGNITION_SUCCESS_HEADER, VALIDATE_ONLY_HEADER,
};
pub use transport::{Credentials, RequestBody, RequestParts, Transport, TransportError};
pub use validator::{
    Event, ValidateOptions, ValidationSnapshot, Validator, DEFAULT_DEBOUNCE_TIMEOUT,
};
