//! HTTP response handling and precognition marker checks.

use bytes::Bytes;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::normalize::{self, FieldMessages, StructuredErrors};

/// Marker header every precognitive response must carry.
pub const PRECOGNITION_HEADER: &str = "Precognition";

/// Marker header a successful precognitive response carries.
pub const PRECOGNITION_SUCCESS_HEADER: &str = "Precognition-Success";

/// Request header listing the fields the server should validate.
pub const VALIDATE_ONLY_HEADER: &str = "Precognition-Validate-Only";

/// HTTP response as seen by the coordination core.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    body: Bytes,
}

impl Response {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.trim())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(Into::into)
    }

    /// True if the response carries the `Precognition: true` marker.
    pub fn has_precognition_marker(&self) -> bool {
        self.header(PRECOGNITION_HEADER)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// True if the response carries the `Precognition-Success: true` marker.
    pub fn has_precognition_success_marker(&self) -> bool {
        self.header(PRECOGNITION_SUCCESS_HEADER)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// Parse a 422 body into the canonical structured error map.
    ///
    /// Accepts both per-field shapes (bare message or message list).
    pub fn validation_errors(&self) -> Result<StructuredErrors> {
        let payload: ValidationPayload = self.json()?;
        Ok(normalize::to_structured(payload.errors))
    }
}

#[derive(Debug, Deserialize)]
struct ValidationPayload {
    #[serde(default)]
    #[allow(dead_code)]
    message: Option<String>,
    #[serde(default)]
    errors: BTreeMap<String, FieldMessages>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, headers: &[(&str, &str)], body: &str) -> Response {
        Response::new(
            status,
            headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            Bytes::from(body.to_string()),
        )
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let resp = response(204, &[("precognition", "true")], "");
        assert_eq!(resp.header("Precognition"), Some("true"));
        assert!(resp.has_precognition_marker());
    }

    #[test]
    fn test_success_markers_are_independent() {
        let resp = response(204, &[("Precognition", "true")], "");
        assert!(resp.has_precognition_marker());
        assert!(!resp.has_precognition_success_marker());
    }

    #[test]
    fn test_validation_errors_accept_both_shapes() {
        let resp = response(
            422,
            &[("Precognition", "true")],
            r#"{"message": "Invalid.", "errors": {"email": "Invalid", "name": ["Required"]}}"#,
        );
        let errors = resp.validation_errors().unwrap();
        assert_eq!(errors.get("email"), Some(&vec!["Invalid".to_string()]));
        assert_eq!(errors.get("name"), Some(&vec!["Required".to_string()]));
    }
}
