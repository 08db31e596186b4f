//! Lifecycle state machine for startable services.

use parking_lot::Mutex;

use stepflow_model::{FlowError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServiceState {
    #[default]
    Built,
    Started,
    Stopped,
    Shutdown,
}

/// Tracks one service's lifecycle behind a single mutex.
///
/// Transitions are idempotent so stop/shutdown can be called from several
/// teardown paths without bookkeeping at the call sites.
#[derive(Debug, Default)]
pub struct ServiceLifecycle {
    state: Mutex<ServiceState>,
}

impl ServiceLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ServiceState {
        *self.state.lock()
    }

    pub fn is_started(&self) -> bool {
        self.state() == ServiceState::Started
    }

    /// Transition to started. `Ok(true)` when this call performed the
    /// transition, `Ok(false)` when already started. Starting after
    /// shutdown is a lifecycle error.
    pub fn to_started(&self) -> Result<bool> {
        let mut state = self.state.lock();
        match *state {
            ServiceState::Started => Ok(false),
            ServiceState::Shutdown => Err(FlowError::lifecycle(
                "cannot start a service that has been shut down",
            )),
            ServiceState::Built | ServiceState::Stopped => {
                *state = ServiceState::Started;
                Ok(true)
            }
        }
    }

    /// Transition to stopped. `true` when this call performed the
    /// transition.
    pub fn to_stopped(&self) -> bool {
        let mut state = self.state.lock();
        if *state == ServiceState::Started {
            *state = ServiceState::Stopped;
            true
        } else {
            false
        }
    }

    /// Transition to shutdown, from any state. `true` when this call
    /// performed the transition.
    pub fn to_shutdown(&self) -> bool {
        let mut state = self.state.lock();
        if *state == ServiceState::Shutdown {
            false
        } else {
            *state = ServiceState::Shutdown;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_stop_restart() {
        let lifecycle = ServiceLifecycle::new();
        assert_eq!(lifecycle.state(), ServiceState::Built);
        assert!(lifecycle.to_started().unwrap());
        assert!(!lifecycle.to_started().unwrap());
        assert!(lifecycle.to_stopped());
        assert!(!lifecycle.to_stopped());
        assert!(lifecycle.to_started().unwrap());
    }

    #[test]
    fn shutdown_is_terminal() {
        let lifecycle = ServiceLifecycle::new();
        lifecycle.to_started().unwrap();
        assert!(lifecycle.to_shutdown());
        assert!(!lifecycle.to_shutdown());
        assert!(lifecycle.to_started().is_err());
    }
}
