//! Radio power state gate
//!
//! Every publish or connect waits here until the stack has reported a power
//! state. The native manager object is created lazily on first use.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};
use tokio::sync::watch;

use super::backend::RadioBackend;
use super::types::PowerState;

pub struct PowerStateGate {
    backend: Arc<dyn RadioBackend>,
    initialized: AtomicBool,
    state: watch::Sender<PowerState>,
}

impl PowerStateGate {
    pub fn new(backend: Arc<dyn RadioBackend>) -> Self {
        let (state, _) = watch::channel(PowerState::Unknown);
        Self {
            backend,
            initialized: AtomicBool::new(false),
            state,
        }
    }

    fn ensure_initialized(&self) {
        if !self.initialized.swap(true, Ordering::SeqCst) {
            debug!("Initializing radio manager");
            self.backend.initialize();
        }
    }

    /// Non-blocking snapshot of the power state
    pub fn current_state(&self) -> PowerState {
        self.ensure_initialized();
        *self.state.borrow()
    }

    /// Wait until the state leaves `Unknown` and return it.
    ///
    /// Any number of callers may wait concurrently; all of them resolve.
    pub async fn await_powered_on(&self) -> PowerState {
        self.ensure_initialized();
        let mut rx = self.state.subscribe();
        let state = match rx.wait_for(PowerState::is_known).await {
            Ok(state) => *state,
            // The sender lives as long as the gate
            Err(_) => PowerState::Unknown,
        };
        state
    }

    /// Apply a state reported by the stack, returning the previous one
    pub fn set_state(&self, state: PowerState) -> PowerState {
        let previous = self.state.send_replace(state);
        if previous != state {
            info!("Radio power state changed: {} -> {}", previous, state);
        }
        previous
    }
}
