//! Scripted in-memory transport for integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use augur::{RequestBody, RequestParts, Response, Transport, TransportError};

/// One recorded outgoing request.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body_json: Option<serde_json::Value>,
    pub has_body: bool,
}

impl RecordedCall {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

enum Scripted {
    Ok(Response),
    Err(TransportError),
}

#[derive(Default)]
struct MockInner {
    script: VecDeque<Scripted>,
    calls: Vec<RecordedCall>,
}

/// Transport that replays scripted outcomes and records every call.
///
/// An empty script yields the default successful precognitive response
/// (204 with both markers). An optional delay keeps requests in flight so
/// cancellation can race them.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_ok(&self, response: Response) {
        self.inner
            .lock()
            .unwrap()
            .script
            .push_back(Scripted::Ok(response));
    }

    pub fn push_err(&self, error: TransportError) {
        self.inner
            .lock()
            .unwrap()
            .script
            .push_back(Scripted::Err(error));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.lock().unwrap().calls.len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: RequestParts) -> Result<Response, TransportError> {
        let scripted = {
            let mut inner = self.inner.lock().unwrap();
            let body_json = match &request.body {
                Some(RequestBody::Json(value)) => Some(value.clone()),
                _ => None,
            };
            inner.calls.push(RecordedCall {
                method: request.method.to_string(),
                url: request.url.to_string(),
                headers: request.headers.clone(),
                body_json,
                has_body: request.body.is_some(),
            });
            inner.script.pop_front()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match scripted {
            Some(Scripted::Ok(response)) => Ok(response),
            Some(Scripted::Err(error)) => Err(error),
            None => Ok(precognition_success()),
        }
    }
}

/// 204 response carrying both precognition markers.
pub fn precognition_success() -> Response {
    Response::new(
        204,
        vec![
            ("Precognition".to_string(), "true".to_string()),
            ("Precognition-Success".to_string(), "true".to_string()),
        ],
        Bytes::new(),
    )
}

/// Response carrying only the core precognition marker.
pub fn precognition_response(status: u16, body: &str) -> Response {
    Response::new(
        status,
        vec![("Precognition".to_string(), "true".to_string())],
        Bytes::from(body.to_string()),
    )
}

/// Response with no precognition markers at all.
pub fn bare_response(status: u16, body: &str) -> Response {
    Response::new(status, Vec::new(), Bytes::from(body.to_string()))
}
