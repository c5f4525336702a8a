//! Restart deferral gate
//!
//! Hosts sometimes need to hold restarts back during sensitive operations.
//! The gate is a two-state machine: `Allowed` runs restart requests
//! immediately; `Blocked` holds at most one pending request and replays it
//! when the gate reopens. Requests arriving while one is already held are
//! coalesced into it.

use std::sync::Mutex;
use tracing::debug;

/// A deferred restart action
pub type RestartAction = Box<dyn FnOnce() + Send>;

enum GateState {
    Allowed,
    Blocked { pending: Option<RestartAction> },
}

/// Gate between restart requests and the host's restart trigger
pub struct RestartGate {
    state: Mutex<GateState>,
}

impl RestartGate {
    /// Create an open gate
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Allowed),
        }
    }

    /// Block restarts; requests are held until [`allow`](Self::allow)
    pub fn disallow(&self) {
        let mut state = self.state.lock().unwrap();
        if matches!(*state, GateState::Allowed) {
            *state = GateState::Blocked { pending: None };
            debug!("restarts blocked");
        }
    }

    /// Reopen the gate, running any held restart request
    pub fn allow(&self) {
        let pending = {
            let mut state = self.state.lock().unwrap();
            match std::mem::replace(&mut *state, GateState::Allowed) {
                GateState::Blocked { pending } => pending,
                GateState::Allowed => None,
            }
        };

        if let Some(action) = pending {
            debug!("restarts allowed, running deferred restart");
            action();
        }
    }

    /// Request a restart: runs now when allowed, is held when blocked
    ///
    /// Returns whether the action ran immediately.
    pub fn request(&self, action: RestartAction) -> bool {
        let run_now = {
            let mut state = self.state.lock().unwrap();
            match &mut *state {
                GateState::Allowed => true,
                GateState::Blocked { pending } => {
                    if pending.is_none() {
                        *pending = Some(action);
                        debug!("restart request deferred");
                    } else {
                        debug!("restart request coalesced into the pending one");
                    }
                    return false;
                }
            }
        };

        if run_now {
            action();
        }
        run_now
    }

    /// Whether restarts are currently blocked
    pub fn is_blocked(&self) -> bool {
        matches!(*self.state.lock().unwrap(), GateState::Blocked { .. })
    }
}

impl Default for RestartGate {
    fn default() -> Self {
        Self::new()
    }
}
