//! Leading + trailing debouncer.
//!
//! The first trigger in a quiet period runs immediately; the last trigger
//! in a burst runs once, one window after the final trigger. A single
//! isolated trigger therefore runs exactly once, and a rapid burst runs
//! exactly twice.
//!
//! Implemented as an explicit timer state machine (generation counter,
//! window flag, pending flag) on tokio timers. Must be used from within a
//! tokio runtime.

use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Debounced dispatcher for a fixed zero-argument action.
#[derive(Clone)]
pub struct Debouncer {
    state: Arc<Mutex<DebounceState>>,
    action: Arc<dyn Fn() + Send + Sync>,
}

struct DebounceState {
    window: Duration,
    /// Monotonic trigger counter; stale timer tasks detect supersession by
    /// comparing against it.
    generation: u64,
    /// A window is currently open (a timer task is live).
    window_open: bool,
    /// At least one trigger arrived while the window was open.
    pending: bool,
}

impl Debouncer {
    pub fn new(window: Duration, action: Arc<dyn Fn() + Send + Sync>) -> Self {
        Self {
            state: Arc::new(Mutex::new(DebounceState {
                window,
                generation: 0,
                window_open: false,
                pending: false,
            })),
            action,
        }
    }

    pub fn window(&self) -> Duration {
        self.state.lock().expect("debounce mutex poisoned").window
    }

    /// Replace the debounce window. Any pending trailing invocation is
    /// cancelled; the new window applies from the next trigger.
    pub fn set_window(&self, window: Duration) {
        let mut state = self.state.lock().expect("debounce mutex poisoned");
        state.window = window;
        state.generation += 1;
        state.window_open = false;
        state.pending = false;
    }

    /// Trigger the debounced action.
    pub fn call(&self) {
        let fire_leading = {
            let mut state = self.state.lock().expect("debounce mutex poisoned");
            state.generation += 1;
            let generation = state.generation;
            let window = state.window;
            let leading = !state.window_open;
            if leading {
                state.window_open = true;
                state.pending = false;
            } else {
                state.pending = true;
            }

            let shared = Arc::clone(&self.state);
            let action = Arc::clone(&self.action);
            tokio::spawn(async move {
                tokio::time::sleep(window).await;
                let fire_trailing = {
                    let mut state = shared.lock().expect("debounce mutex poisoned");
                    if state.generation != generation {
                        // A newer trigger rescheduled the window.
                        return;
                    }
                    state.window_open = false;
                    std::mem::take(&mut state.pending)
                };
                if fire_trailing {
                    action();
                }
            });

            leading
        };

        if fire_leading {
            (self.action)();
        }
    }
}
