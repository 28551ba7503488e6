//! Transport client: the single chokepoint for outgoing requests.
//!
//! Owns the resolved configuration (base URL, timeout, credentials,
//! default headers), the abort registry, fingerprint resolution, and
//! status-coded outcome dispatch. Configuration is injected at
//! construction; there are no ambient globals.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use url::Url;

use crate::data::{self, FormData};
use crate::error::{Error, Result};
use crate::fingerprint::{
    abort_pair, default_fingerprint, AbortRegistry, AbortSignal, Fingerprint,
};
use crate::response::{Response, PRECOGNITION_HEADER, VALIDATE_ONLY_HEADER};
use crate::transport::{Credentials, RequestBody, RequestParts, Transport, TransportError};

/// Status-coded response handler. Returning `Some` replaces the response
/// the caller receives; `None` passes the original through.
pub type Handler = Box<dyn FnMut(&Response) -> Result<Option<Response>> + Send>;

/// Predicate deciding whether a response is a successful precognitive
/// outcome. Default: status 204 with the `Precognition-Success` marker.
pub type SuccessPredicate = Arc<dyn Fn(&Response) -> bool + Send + Sync>;

/// Fingerprint resolver: `(method, base URL, call-site URL)` to key.
/// Returning `None` disables deduplication for the request.
pub type FingerprintResolver = Arc<dyn Fn(&Method, Option<&Url>, &str) -> Option<String> + Send + Sync>;

/// Per-call request parameters and outcome hooks.
pub struct RequestConfig {
    pub data: FormData,
    pub params: FormData,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub credentials: Option<Credentials>,
    pub fingerprint: Fingerprint,
    pub only: BTreeSet<String>,
    /// Attach the precognition marker and abort bookkeeping. Default true.
    pub precognitive: bool,
    pub signal: Option<AbortSignal>,
    on_before: Option<Box<dyn FnMut() -> bool + Send>>,
    on_start: Option<Box<dyn FnMut() + Send>>,
    on_finish: Option<Box<dyn FnMut() + Send>>,
    on_precognition_success: Option<Handler>,
    on_success: Option<Handler>,
    handlers: HashMap<u16, Handler>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            data: FormData::new(),
            params: FormData::new(),
            headers: Vec::new(),
            timeout: None,
            credentials: None,
            fingerprint: Fingerprint::Auto,
            only: BTreeSet::new(),
            precognitive: true,
            signal: None,
            on_before: None,
            on_start: None,
            on_finish: None,
            on_precognition_success: None,
            on_success: None,
            handlers: HashMap::new(),
        }
    }
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(mut self, data: FormData) -> Self {
        self.data = data;
        self
    }

    pub fn params(mut self, params: FormData) -> Self {
        self.params = params;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn fingerprint(mut self, fingerprint: impl Into<Fingerprint>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    /// Opt out of deduplication and supersession for this request.
    pub fn without_fingerprint(mut self) -> Self {
        self.fingerprint = Fingerprint::Disabled;
        self
    }

    /// Send as a plain (non-precognitive) request: no marker header, no
    /// marker enforcement, no automatic abort handle.
    pub fn without_precognition(mut self) -> Self {
        self.precognitive = false;
        self
    }

    /// Restrict server-side validation to the named fields.
    pub fn only<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Deprecated alias for [`RequestConfig::only`], accepted as input for
    /// callers migrating legacy configuration.
    #[deprecated(note = "use `only`")]
    pub fn validate<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only(fields)
    }

    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Runs before anything is sent; returning `false` vetoes the request
    /// and the call resolves with `Ok(None)`.
    pub fn on_before(mut self, hook: impl FnMut() -> bool + Send + 'static) -> Self {
        self.on_before = Some(Box::new(hook));
        self
    }

    pub fn on_start(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.on_start = Some(Box::new(hook));
        self
    }

    /// Runs last on every path that dispatched a request, success or
    /// failure.
    pub fn on_finish(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.on_finish = Some(Box::new(hook));
        self
    }

    pub fn on_precognition_success(
        mut self,
        handler: impl FnMut(&Response) -> Result<Option<Response>> + Send + 'static,
    ) -> Self {
        self.on_precognition_success = Some(Box::new(handler));
        self
    }

    pub fn on_success(
        mut self,
        handler: impl FnMut(&Response) -> Result<Option<Response>> + Send + 'static,
    ) -> Self {
        self.on_success = Some(Box::new(handler));
        self
    }

    pub fn on_status(
        mut self,
        status: u16,
        handler: impl FnMut(&Response) -> Result<Option<Response>> + Send + 'static,
    ) -> Self {
        self.handlers.insert(status, Box::new(handler));
        self
    }

    pub fn on_unauthorized(
        self,
        handler: impl FnMut(&Response) -> Result<Option<Response>> + Send + 'static,
    ) -> Self {
        self.on_status(401, handler)
    }

    pub fn on_forbidden(
        self,
        handler: impl FnMut(&Response) -> Result<Option<Response>> + Send + 'static,
    ) -> Self {
        self.on_status(403, handler)
    }

    pub fn on_not_found(
        self,
        handler: impl FnMut(&Response) -> Result<Option<Response>> + Send + 'static,
    ) -> Self {
        self.on_status(404, handler)
    }

    pub fn on_conflict(
        self,
        handler: impl FnMut(&Response) -> Result<Option<Response>> + Send + 'static,
    ) -> Self {
        self.on_status(409, handler)
    }

    pub fn on_validation_error(
        self,
        handler: impl FnMut(&Response) -> Result<Option<Response>> + Send + 'static,
    ) -> Self {
        self.on_status(422, handler)
    }

    pub fn on_locked(
        self,
        handler: impl FnMut(&Response) -> Result<Option<Response>> + Send + 'static,
    ) -> Self {
        self.on_status(423, handler)
    }
}

/// Configuration-merging wrapper that stamps a validation scope onto a
/// request config. Explicit replacement for dynamic method interception.
pub fn with_validation_scope<I, S>(fields: I) -> impl Fn(RequestConfig) -> RequestConfig
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let scope: BTreeSet<String> = fields.into_iter().map(Into::into).collect();
    move |mut config| {
        config.only.extend(scope.iter().cloned());
        config
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    transport: Arc<dyn Transport>,
    base_url: Option<Url>,
    timeout: Option<Duration>,
    credentials: Credentials,
    default_headers: Vec<(String, String)>,
    resolver: FingerprintResolver,
    success_predicate: SuccessPredicate,
}

impl ClientBuilder {
    pub fn base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Replace the fingerprint resolver.
    pub fn fingerprint_resolver(
        mut self,
        resolver: impl Fn(&Method, Option<&Url>, &str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Replace the "successful precognitive response" predicate.
    pub fn success_predicate(
        mut self,
        predicate: impl Fn(&Response) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.success_predicate = Arc::new(predicate);
        self
    }

    pub fn build(self) -> Client {
        Client {
            inner: Arc::new(ClientInner {
                transport: self.transport,
                base_url: self.base_url,
                timeout: self.timeout,
                credentials: self.credentials,
                default_headers: self.default_headers,
                resolver: self.resolver,
                success_predicate: self.success_predicate,
                registry: AbortRegistry::new(),
            }),
        }
    }
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    base_url: Option<Url>,
    timeout: Option<Duration>,
    credentials: Credentials,
    default_headers: Vec<(String, String)>,
    resolver: FingerprintResolver,
    success_predicate: SuccessPredicate,
    registry: AbortRegistry,
}

/// Request/validation transport client.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn builder(transport: Arc<dyn Transport>) -> ClientBuilder {
        ClientBuilder {
            transport,
            base_url: None,
            timeout: None,
            credentials: Credentials::default(),
            default_headers: Vec::new(),
            resolver: Arc::new(|method, base_url, url| default_fingerprint(method, base_url, url)),
            success_predicate: Arc::new(|response: &Response| {
                response.status == 204 && response.has_precognition_success_marker()
            }),
        }
    }

    /// Registry of in-flight cancellation handles, keyed by fingerprint.
    pub fn abort_registry(&self) -> &AbortRegistry {
        &self.inner.registry
    }

    pub async fn get(
        &self,
        url: &str,
        data: FormData,
        config: RequestConfig,
    ) -> Result<Option<Response>> {
        self.request(Method::GET, url, data, config).await
    }

    pub async fn post(
        &self,
        url: &str,
        data: FormData,
        config: RequestConfig,
    ) -> Result<Option<Response>> {
        self.request(Method::POST, url, data, config).await
    }

    pub async fn put(
        &self,
        url: &str,
        data: FormData,
        config: RequestConfig,
    ) -> Result<Option<Response>> {
        self.request(Method::PUT, url, data, config).await
    }

    pub async fn patch(
        &self,
        url: &str,
        data: FormData,
        config: RequestConfig,
    ) -> Result<Option<Response>> {
        self.request(Method::PATCH, url, data, config).await
    }

    pub async fn delete(
        &self,
        url: &str,
        data: FormData,
        config: RequestConfig,
    ) -> Result<Option<Response>> {
        self.request(Method::DELETE, url, data, config).await
    }

    /// Issue a request. Resolves with `Ok(None)` only when the `on_before`
    /// hook vetoed the call.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        data: FormData,
        mut config: RequestConfig,
    ) -> Result<Option<Response>> {
        // Call-site data merged with config data, config wins.
        let merged = data::merge(data, std::mem::take(&mut config.data));
        let mut full_url = self.resolve_url(url)?;

        let folds_into_query = method == Method::GET || method == Method::DELETE;
        let (query, body_data) = if folds_into_query {
            (
                data::merge(merged, std::mem::take(&mut config.params)),
                None,
            )
        } else {
            (std::mem::take(&mut config.params), Some(merged))
        };
        if !query.is_empty() {
            let pairs = data::to_query_pairs(&query)?;
            let mut serializer = full_url.query_pairs_mut();
            for (key, value) in &pairs {
                serializer.append_pair(key, value);
            }
        }

        let mut headers = self.inner.default_headers.clone();
        for (name, value) in std::mem::take(&mut config.headers) {
            set_header(&mut headers, &name, &value);
        }

        let explicit_content_type = headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("Content-Type"));
        let body = match body_data {
            Some(payload) if data::contains_files(&payload) => {
                if !explicit_content_type {
                    set_header(&mut headers, "Content-Type", "multipart/form-data");
                }
                Some(RequestBody::Multipart(payload))
            }
            Some(payload) => {
                if !explicit_content_type {
                    set_header(&mut headers, "Content-Type", "application/json");
                }
                Some(RequestBody::Json(data::to_json(&payload)?))
            }
            None => None,
        };

        if config.precognitive {
            set_header(&mut headers, PRECOGNITION_HEADER, "true");
        }
        if !config.only.is_empty() {
            let joined = config
                .only
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(",");
            set_header(&mut headers, VALIDATE_ONLY_HEADER, &joined);
        }

        let fingerprint = match &config.fingerprint {
            Fingerprint::Key(key) => Some(key.clone()),
            Fingerprint::Disabled => None,
            Fingerprint::Auto => {
                (self.inner.resolver)(&method, self.inner.base_url.as_ref(), url)
            }
        };

        let mut signal = config.signal.take();
        if let Some(key) = fingerprint.as_deref() {
            // Newer request wins the slot: cancel the old one first.
            self.inner.registry.abort_existing(key);
            if signal.is_none() && config.precognitive {
                let (handle, fresh) = abort_pair();
                self.inner.registry.register(key, handle);
                signal = Some(fresh);
            }
        }

        if let Some(hook) = config.on_before.as_mut() {
            if !hook() {
                return Ok(None);
            }
        }
        if let Some(hook) = config.on_start.as_mut() {
            hook();
        }

        tracing::debug!(%method, url = %full_url, "dispatching request");
        let parts = RequestParts {
            method,
            url: full_url,
            headers,
            body,
            timeout: config.timeout.or(self.inner.timeout),
            credentials: config.credentials.unwrap_or(self.inner.credentials),
            abort: signal.clone(),
        };

        let outcome = self.dispatch(parts, signal).await;
        let result = match outcome {
            Ok(response) => self.settle(response, &mut config, false),
            Err(TransportError::Response(response)) => self.settle(response, &mut config, true),
            Err(TransportError::Cancelled) => Err(Error::Cancelled),
            Err(TransportError::Timeout(limit)) => Err(Error::Timeout(limit)),
            Err(TransportError::Network(message)) => Err(Error::network(message)),
        };

        if let Some(hook) = config.on_finish.as_mut() {
            hook();
        }
        result
    }

    /// Send through the transport, racing the abort signal and deadline.
    /// Enforced here so semantics do not depend on transport cooperation.
    async fn dispatch(
        &self,
        parts: RequestParts,
        signal: Option<AbortSignal>,
    ) -> std::result::Result<Response, TransportError> {
        let timeout = parts.timeout;
        let transport = Arc::clone(&self.inner.transport);
        let send = async move {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, transport.send(parts)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(TransportError::Timeout(limit)),
                },
                None => transport.send(parts).await,
            }
        };
        match signal {
            Some(signal) => {
                tokio::select! {
                    outcome = send => outcome,
                    _ = signal.aborted() => Err(TransportError::Cancelled),
                }
            }
            None => send.await,
        }
    }

    /// Classify a server response: marker enforcement, success hooks,
    /// status-coded handler table.
    fn settle(
        &self,
        response: Response,
        config: &mut RequestConfig,
        from_error: bool,
    ) -> Result<Option<Response>> {
        if config.precognitive && !response.has_precognition_marker() {
            return Err(Error::MissingPrecognitionHeader);
        }

        let mut replacement: Option<Response> = None;
        if config.precognitive && (self.inner.success_predicate)(&response) {
            if let Some(handler) = config.on_precognition_success.as_mut() {
                replacement = handler(&response)?;
            }
        } else if response.is_success() {
            if let Some(handler) = config.on_success.as_mut() {
                replacement = handler(&response)?;
            }
        }

        if let Some(handler) = config.handlers.get_mut(&response.status) {
            let handled = handler(&response)?;
            return Ok(Some(handled.or(replacement).unwrap_or(response)));
        }

        if from_error {
            return Err(Error::status(response.status, response.text()));
        }
        Ok(Some(replacement.unwrap_or(response)))
    }

    fn resolve_url(&self, url: &str) -> Result<Url> {
        match &self.inner.base_url {
            Some(base) => base.join(url).map_err(Into::into),
            None => Url::parse(url).map_err(Into::into),
        }
    }
}

fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
    headers.push((name.to_string(), value.to_string()));
}
