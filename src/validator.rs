//! Debounced, stateful field validator.
//!
//! Turns discrete field-level interaction events into debounced,
//! deduplicated validation requests and tracks touched/validated/error
//! state for UI bindings. Bindings may only depend on the operations
//! here plus [`Validator::on`] subscriptions; there is no other surface.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::client::RequestConfig;
use crate::data::{FormData, FormValue};
use crate::debounce::Debouncer;
use crate::error::Result;
use crate::normalize::{self, FieldMessages, StructuredErrors};
use crate::response::Response;

/// Default debounce window between validation triggers.
pub const DEFAULT_DEBOUNCE_TIMEOUT: Duration = Duration::from_millis(1500);

/// Future returned by the caller-supplied request callback.
pub type RequestFuture = Pin<Box<dyn Future<Output = Result<Option<Response>>> + Send>>;

/// Caller-supplied "perform a request" callback. Receives a config with
/// the validator's hooks, payload, and field scope pre-installed; the
/// callback supplies URL and method, typically via a [`crate::Client`].
pub type RequestCallback = Box<dyn Fn(RequestConfig) -> RequestFuture + Send + Sync>;

type Listener = Arc<dyn Fn() + Send + Sync>;

/// Payload and touched-set pair handed to the before-validation hook.
#[derive(Debug, Clone)]
pub struct ValidationSnapshot {
    pub data: FormData,
    pub touched: BTreeSet<String>,
}

/// Hook receiving the new and previous snapshots; returning `false`
/// cancels the validation run.
pub type BeforeValidationHook =
    Arc<dyn Fn(&ValidationSnapshot, &ValidationSnapshot) -> bool + Send + Sync>;

/// Validator change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    ErrorsChanged,
    TouchedChanged,
    ValidatingChanged,
    ValidatedChanged,
}

impl Event {
    fn index(self) -> usize {
        match self {
            Self::ErrorsChanged => 0,
            Self::TouchedChanged => 1,
            Self::ValidatingChanged => 2,
            Self::ValidatedChanged => 3,
        }
    }
}

/// Per-call validation options.
#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// Override the field scope for the next run (default: full touched
    /// set).
    pub only: Option<BTreeSet<String>>,
}

struct State {
    touched: BTreeSet<String>,
    validated: BTreeSet<String>,
    errors: StructuredErrors,
    validating: bool,
    file_validation: bool,
    /// Defaults supplied at construction; `reset` rolls fields back here.
    initial_data: FormData,
    /// Latest values seen through `validate`.
    current_data: FormData,
    /// Snapshot as of the last completed round-trip.
    old_data: FormData,
    old_touched: BTreeSet<String>,
    pending_only: Option<BTreeSet<String>>,
    /// Monotonic run ids; `active_run` is the run currently owning the
    /// in-flight slot (0 when idle). A superseded run's finish must not
    /// clear `validating` or commit its snapshot.
    run_counter: u64,
    active_run: u64,
}

struct ValidatorInner {
    state: Mutex<State>,
    listeners: Mutex<[Vec<Listener>; 4]>,
    before_hook: Mutex<Option<BeforeValidationHook>>,
    callback: RequestCallback,
    debouncer: Debouncer,
}

/// Debounced field validator. Cheap to clone; clones share state.
///
/// Must be used from within a tokio runtime: validation runs are spawned
/// tasks.
#[derive(Clone)]
pub struct Validator {
    inner: Arc<ValidatorInner>,
}

impl Validator {
    pub fn new(callback: RequestCallback, initial_data: FormData) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<ValidatorInner>| {
            let weak = weak.clone();
            let action: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let validator = Validator { inner };
                    tokio::spawn(async move {
                        if let Err(err) = validator.run_validation().await {
                            tracing::warn!(error = %err, "validation request failed");
                        }
                    });
                }
            });
            ValidatorInner {
                state: Mutex::new(State {
                    touched: BTreeSet::new(),
                    validated: BTreeSet::new(),
                    errors: StructuredErrors::new(),
                    validating: false,
                    file_validation: false,
                    current_data: initial_data.clone(),
                    old_data: initial_data.clone(),
                    initial_data,
                    old_touched: BTreeSet::new(),
                    pending_only: None,
                    run_counter: 0,
                    active_run: 0,
                }),
                listeners: Mutex::new(std::array::from_fn(|_| Vec::new())),
                before_hook: Mutex::new(None),
                callback,
                debouncer: Debouncer::new(DEFAULT_DEBOUNCE_TIMEOUT, action),
            }
        });
        Self { inner }
    }

    /// Validate one field with its latest value.
    ///
    /// Skipped entirely when the value is file-valued and file validation
    /// has not been enabled, and when the value deep-equals the field's
    /// value as of the last completed round-trip.
    pub fn validate(&self, field: &str, value: impl Into<FormValue>) {
        self.validate_with(field, value, ValidateOptions::default());
    }

    /// [`Validator::validate`] with per-call options.
    pub fn validate_with(&self, field: &str, value: impl Into<FormValue>, options: ValidateOptions) {
        let value = value.into();
        let proceed = self.mutate(|state, events| {
            if value.contains_files() && !state.file_validation {
                return Err(());
            }
            if state.old_data.get(field) == Some(&value) {
                return Ok(false);
            }
            state.current_data.insert(field.to_string(), value.clone());
            if state.touched.insert(field.to_string()) {
                events.push(Event::TouchedChanged);
            }
            if let Some(only) = options.only.clone() {
                state.pending_only = Some(only);
            }
            Ok(true)
        });
        match proceed {
            Err(()) => {
                tracing::warn!(
                    field,
                    "skipping validation of file-valued field; call validate_files() to enable"
                );
            }
            Ok(false) => {}
            Ok(true) => self.inner.debouncer.call(),
        }
    }

    /// Force a (still debounced) validation pass over the current touched
    /// set.
    pub fn validate_all(&self) {
        self.inner.debouncer.call();
    }

    /// Add fields to the touched set without triggering a request.
    pub fn touch<I, S>(&self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutate(|state, events| {
            let mut grew = false;
            for field in fields {
                grew |= state.touched.insert(field.into());
            }
            if grew {
                events.push(Event::TouchedChanged);
            }
        });
    }

    /// Replace the error map, normalizing either accepted shape.
    pub fn set_errors<I, K>(&self, errors: I)
    where
        I: IntoIterator<Item = (K, FieldMessages)>,
        K: Into<String>,
    {
        let structured = normalize::to_structured(errors);
        self.mutate(|state, events| {
            if state.errors == structured {
                return;
            }
            // A field whose error was cleared by hand is not thereby valid;
            // it leaves `validated` until a fresh round-trip completes.
            let cleared: Vec<String> = state
                .errors
                .keys()
                .filter(|field| !structured.contains_key(*field))
                .cloned()
                .collect();
            let mut shrank = false;
            for field in cleared {
                shrank |= state.validated.remove(&field);
            }
            if shrank {
                events.push(Event::ValidatedChanged);
            }
            state.errors = structured;
            events.push(Event::ErrorsChanged);
        });
    }

    /// Remove a single field's errors. The field leaves `validated` until
    /// it is re-validated.
    pub fn forget_error(&self, field: &str) {
        self.mutate(|state, events| {
            if state.errors.remove(field).is_some() {
                events.push(Event::ErrorsChanged);
                if state.validated.remove(field) {
                    events.push(Event::ValidatedChanged);
                }
            }
        });
    }

    /// With no fields, clear the touched set entirely. With fields, remove
    /// them from the touched set and roll their committed snapshot back to
    /// the construction-time defaults.
    pub fn reset(&self, fields: &[&str]) {
        self.mutate(|state, events| {
            if fields.is_empty() {
                if !state.touched.is_empty() {
                    state.touched.clear();
                    events.push(Event::TouchedChanged);
                }
                return;
            }
            let mut shrank = false;
            for field in fields {
                shrank |= state.touched.remove(*field);
                match state.initial_data.get(*field).cloned() {
                    Some(value) => {
                        state.old_data.insert((*field).to_string(), value.clone());
                        state.current_data.insert((*field).to_string(), value);
                    }
                    None => {
                        state.old_data.remove(*field);
                        state.current_data.remove(*field);
                    }
                }
            }
            if shrank {
                events.push(Event::TouchedChanged);
            }
        });
    }

    /// Replace the debounce window. A pending trailing run is cancelled;
    /// the new window applies from the next trigger.
    pub fn set_debounce_timeout(&self, timeout: Duration) {
        self.inner.debouncer.set_window(timeout);
    }

    pub fn debounce_timeout(&self) -> Duration {
        self.inner.debouncer.window()
    }

    /// Subscribe to a change event. Listeners live as long as the
    /// validator.
    pub fn on(&self, event: Event, listener: impl Fn() + Send + Sync + 'static) -> &Self {
        let mut listeners = self.inner.listeners.lock().expect("listener mutex poisoned");
        listeners[event.index()].push(Arc::new(listener));
        drop(listeners);
        self
    }

    /// Install the before-validation hook.
    pub fn on_before_validation(&self, hook: BeforeValidationHook) -> &Self {
        *self
            .inner
            .before_hook
            .lock()
            .expect("before hook mutex poisoned") = Some(hook);
        self
    }

    /// Irrevocably enable validation of file-valued fields.
    pub fn validate_files(&self) -> &Self {
        self.mutate(|state, _| state.file_validation = true);
        self
    }

    pub fn touched(&self) -> BTreeSet<String> {
        self.lock_state().touched.clone()
    }

    pub fn validated(&self) -> BTreeSet<String> {
        self.lock_state().validated.clone()
    }

    /// Fields whose most recent round-trip completed without errors.
    pub fn valid(&self) -> BTreeSet<String> {
        let state = self.lock_state();
        state
            .validated
            .iter()
            .filter(|field| !state.errors.contains_key(*field))
            .cloned()
            .collect()
    }

    pub fn errors(&self) -> StructuredErrors {
        self.lock_state().errors.clone()
    }

    pub fn has_errors(&self) -> bool {
        !self.lock_state().errors.is_empty()
    }

    pub fn validating(&self) -> bool {
        self.lock_state().validating
    }

    /// One debounced validation run: capture scope and snapshots, invoke
    /// the caller callback with hooks installed, swallow expected noise.
    async fn run_validation(&self) -> Result<()> {
        let (run_id, scope, snapshot, previous) = {
            let mut state = self.lock_state();
            state.run_counter += 1;
            let run_id = state.run_counter;
            let scope = state
                .pending_only
                .take()
                .unwrap_or_else(|| state.touched.clone());
            let snapshot = ValidationSnapshot {
                data: state.current_data.clone(),
                touched: state.touched.clone(),
            };
            let previous = ValidationSnapshot {
                data: state.old_data.clone(),
                touched: state.old_touched.clone(),
            };
            (run_id, scope, snapshot, previous)
        };

        let before = self
            .inner
            .before_hook
            .lock()
            .expect("before hook mutex poisoned")
            .clone();
        if let Some(hook) = before {
            if !hook(&snapshot, &previous) {
                return Ok(());
            }
        }

        let config = RequestConfig::new()
            .data(snapshot.data.clone())
            .only(scope.iter().cloned())
            .on_start({
                let validator = self.clone();
                move || validator.start_run(run_id)
            })
            .on_finish({
                let validator = self.clone();
                let snapshot = snapshot.clone();
                move || validator.finish_run(run_id, snapshot.clone())
            })
            .on_precognition_success({
                let validator = self.clone();
                let scope = scope.clone();
                move |_response| {
                    validator.mark_clean(&scope);
                    Ok(None)
                }
            })
            .on_success({
                let validator = self.clone();
                let scope = scope.clone();
                move |_response| {
                    validator.mark_validated(&scope);
                    Ok(None)
                }
            })
            .on_validation_error({
                let validator = self.clone();
                let scope = scope.clone();
                move |response: &Response| {
                    let errors = response.validation_errors()?;
                    validator.apply_validation_errors(&scope, errors);
                    Ok(None)
                }
            });

        match (self.inner.callback)(config).await {
            Ok(_) => Ok(()),
            // Supersession and 422 are routine; surfacing them would flood
            // the embedding application with expected rejections.
            Err(err) if err.is_cancelled() || err.is_validation_rejection() => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn start_run(&self, run_id: u64) {
        self.mutate(|state, events| {
            state.active_run = run_id;
            if !state.validating {
                state.validating = true;
                events.push(Event::ValidatingChanged);
            }
        });
    }

    /// Only the run that still owns the in-flight slot may clear
    /// `validating` and commit its snapshot; a superseded run finishing
    /// late is a no-op.
    fn finish_run(&self, run_id: u64, snapshot: ValidationSnapshot) {
        self.mutate(|state, events| {
            if state.active_run != run_id {
                return;
            }
            state.active_run = 0;
            if state.validating {
                state.validating = false;
                events.push(Event::ValidatingChanged);
            }
            state.old_data = snapshot.data;
            state.old_touched = snapshot.touched;
        });
    }

    /// Successful precognitive outcome: scope fields are clean and
    /// validated.
    fn mark_clean(&self, scope: &BTreeSet<String>) {
        self.mutate(|state, events| {
            let mut errors_changed = false;
            for field in scope {
                errors_changed |= state.errors.remove(field).is_some();
            }
            if errors_changed {
                events.push(Event::ErrorsChanged);
            }
            let before = state.validated.len();
            state.validated.extend(scope.iter().cloned());
            if state.validated.len() != before {
                events.push(Event::ValidatedChanged);
            }
        });
    }

    /// Plain 2xx outcome: scope fields validated, errors untouched.
    fn mark_validated(&self, scope: &BTreeSet<String>) {
        self.mutate(|state, events| {
            let before = state.validated.len();
            state.validated.extend(scope.iter().cloned());
            if state.validated.len() != before {
                events.push(Event::ValidatedChanged);
            }
        });
    }

    /// 422 outcome: replace in-scope fields' errors with the returned map,
    /// preserve out-of-scope errors, mark scope validated.
    fn apply_validation_errors(&self, scope: &BTreeSet<String>, errors: StructuredErrors) {
        self.mutate(|state, events| {
            let mut next = state.errors.clone();
            for field in scope {
                next.remove(field);
            }
            for (field, messages) in errors {
                next.insert(field, messages);
            }
            if next != state.errors {
                state.errors = next;
                events.push(Event::ErrorsChanged);
            }
            let before = state.validated.len();
            state.validated.extend(scope.iter().cloned());
            if state.validated.len() != before {
                events.push(Event::ValidatedChanged);
            }
        });
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.state.lock().expect("validator state mutex poisoned")
    }

    /// Apply a mutation, then fire the collected events after all state
    /// changes are committed and the lock is released. Subscribers never
    /// observe partially updated state.
    fn mutate<R>(&self, op: impl FnOnce(&mut State, &mut Vec<Event>) -> R) -> R {
        let mut events = Vec::new();
        let result = {
            let mut state = self.lock_state();
            op(&mut state, &mut events)
        };
        self.emit(&events);
        result
    }

    fn emit(&self, events: &[Event]) {
        if events.is_empty() {
            return;
        }
        let batch: Vec<Listener> = {
            let listeners = self.inner.listeners.lock().expect("listener mutex poisoned");
            events
                .iter()
                .flat_map(|event| listeners[event.index()].iter().cloned())
                .collect()
        };
        for listener in batch {
            listener();
        }
    }
}
