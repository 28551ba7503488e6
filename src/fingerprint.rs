//! Request fingerprinting and in-flight cancellation bookkeeping.
//!
//! A fingerprint identifies a logical request slot. Starting a new request
//! on a slot cancels any request still in flight for the same slot, so a
//! stale response can never overwrite a newer one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use http::Method;
use tokio::sync::Notify;
use url::Url;

/// Fingerprint selection for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Fingerprint {
    /// Use the client's fingerprint resolver.
    #[default]
    Auto,
    /// Explicit fingerprint key.
    Key(String),
    /// Opt out of deduplication and supersession for this request.
    Disabled,
}

impl From<&str> for Fingerprint {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for Fingerprint {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

/// Default fingerprint: `"{method}:{base_url}{url}"`.
pub fn default_fingerprint(method: &Method, base_url: Option<&Url>, url: &str) -> Option<String> {
    let base = base_url.map(Url::as_str).unwrap_or("");
    Some(format!("{method}:{base}{url}"))
}

#[derive(Debug)]
struct AbortInner {
    notify: Notify,
    aborted: AtomicBool,
}

/// Trigger side of a cancellation pair.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    inner: Arc<AbortInner>,
}

/// Observer side of a cancellation pair.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    inner: Arc<AbortInner>,
}

/// Create a linked cancellation handle/signal pair.
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let inner = Arc::new(AbortInner {
        notify: Notify::new(),
        aborted: AtomicBool::new(false),
    });
    (
        AbortHandle {
            inner: Arc::clone(&inner),
        },
        AbortSignal { inner },
    )
}

impl AbortHandle {
    /// Abort the associated request. Idempotent; late subscribers still
    /// observe the cancellation.
    pub fn abort(&self) {
        self.inner.aborted.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::Acquire)
    }

    /// Observer side for this handle.
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::Acquire)
    }

    /// Resolve once the request is aborted.
    pub async fn aborted(&self) {
        loop {
            if self.is_aborted() {
                return;
            }
            let notified = self.inner.notify.notified();
            // Re-check after registering to close the store/notify race.
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

/// In-flight cancellation handles keyed by fingerprint.
///
/// At most one live entry per fingerprint. Registering a new handle for an
/// existing key replaces the old entry; entries are not pruned on request
/// completion, only on reuse. Instance-scoped and mutex-guarded, so the
/// registry is safe on a multi-threaded runtime.
#[derive(Debug, Clone, Default)]
pub struct AbortRegistry {
    inner: Arc<Mutex<HashMap<String, AbortHandle>>>,
}

impl AbortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel and evict the live entry for `key`, if any. Returns whether
    /// an entry was aborted.
    pub fn abort_existing(&self, key: &str) -> bool {
        let removed = {
            let mut entries = self.inner.lock().expect("abort registry mutex poisoned");
            entries.remove(key)
        };
        match removed {
            Some(handle) => {
                tracing::debug!(fingerprint = key, "superseding in-flight request");
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Register a fresh handle for `key`, replacing (without aborting) any
    /// previous entry. Call [`AbortRegistry::abort_existing`] first to
    /// supersede.
    pub fn register(&self, key: &str, handle: AbortHandle) {
        let mut entries = self.inner.lock().expect("abort registry mutex poisoned");
        entries.insert(key.to_string(), handle);
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("abort registry mutex poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_fingerprint_shape() {
        let base = Url::parse("https://api.example.com/").unwrap();
        let fp = default_fingerprint(&Method::POST, Some(&base), "/users");
        assert_eq!(fp.as_deref(), Some("POST:https://api.example.com//users"));
    }

    #[test]
    fn test_registry_replace_aborts_old_entry() {
        let registry = AbortRegistry::new();
        let (first, _first_signal) = abort_pair();
        registry.register("POST:/users", first.clone());

        assert!(registry.abort_existing("POST:/users"));
        assert!(first.is_aborted());

        let (second, _second_signal) = abort_pair();
        registry.register("POST:/users", second.clone());
        assert!(!second.is_aborted());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_abort_existing_on_empty_registry() {
        let registry = AbortRegistry::new();
        assert!(!registry.abort_existing("missing"));
    }

    #[tokio::test]
    async fn test_signal_resolves_after_abort() {
        let (handle, signal) = abort_pair();
        let waiter = tokio::spawn(async move { signal.aborted().await });
        tokio::task::yield_now().await;
        handle.abort();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_late_subscriber_observes_abort() {
        let (handle, signal) = abort_pair();
        handle.abort();
        signal.aborted().await;
        assert!(signal.is_aborted());
    }
}
