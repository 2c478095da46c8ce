//! Lifecycle state for background services.
//!
//! The policy refresh loop reports through a [`ServiceHandle`] so callers can
//! tell a healthy engine from one serving a stale snapshot.
//!
//! # Usage
//!
//! ```rust
//! use authz_core::service::{ServiceHandle, ServiceState};
//!
//! let handle = ServiceHandle::new("policy-refresh");
//! assert_eq!(handle.state(), ServiceState::Stopped);
//!
//! handle.set_state(ServiceState::Ready);
//! assert!(handle.state().is_available());
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

// ============================================================================
// ServiceState
// ============================================================================

/// State of a service in its lifecycle.
#[derive(Clone, Debug, PartialEq)]
pub enum ServiceState {
    /// Not running.
    Stopped,
    /// Initial load in progress.
    Starting,
    /// Running and up to date.
    Ready,
    /// Running, but the last cycle failed; the previous data is still served.
    Degraded(String),
    /// Shutting down.
    Stopping,
    /// Gave up.
    Failed(String),
}

impl ServiceState {
    /// Returns `true` if the service is fully ready.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns `true` if the service can handle requests (Ready or Degraded).
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Ready | Self::Degraded(_))
    }

    /// Returns `true` for Stopped and Failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed(_))
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Starting => write!(f, "starting"),
            Self::Ready => write!(f, "ready"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Stopping => write!(f, "stopping"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

// ============================================================================
// ServiceHandle
// ============================================================================

/// Shared, cloneable view of one service's state.
///
/// Every transition is broadcast to subscribers and timestamped.
#[derive(Clone)]
pub struct ServiceHandle {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    tx: watch::Sender<(ServiceState, DateTime<Utc>)>,
}

impl ServiceHandle {
    /// Creates a handle in [`ServiceState::Stopped`].
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel((ServiceState::Stopped, Utc::now()));
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                tx,
            }),
        }
    }

    /// The service name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The current state.
    pub fn state(&self) -> ServiceState {
        self.inner.tx.borrow().0.clone()
    }

    /// When the current state was entered.
    pub fn since(&self) -> DateTime<Utc> {
        self.inner.tx.borrow().1
    }

    /// Moves to `state`. Re-entering the current state keeps its timestamp.
    pub fn set_state(&self, state: ServiceState) {
        let changed = self.inner.tx.send_if_modified(|current| {
            if current.0 == state {
                return false;
            }
            *current = (state.clone(), Utc::now());
            true
        });
        if changed {
            tracing::info!(service = %self.inner.name, state = %state, "service state changed");
        }
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<(ServiceState, DateTime<Utc>)> {
        self.inner.tx.subscribe()
    }

    /// Waits until the service is available, fails, or `timeout` elapses.
    pub async fn wait_available(&self, timeout: Duration) -> Result<(), String> {
        let mut rx = self.subscribe();
        let name = self.inner.name.clone();

        let outcome = tokio::time::timeout(timeout, async move {
            loop {
                let state = rx.borrow_and_update().0.clone();
                match state {
                    s if s.is_available() => return Ok(()),
                    ServiceState::Failed(reason) => {
                        return Err(format!("service '{name}' failed: {reason}"));
                    }
                    _ => {}
                }
                if rx.changed().await.is_err() {
                    return Err(format!("service '{name}' channel closed"));
                }
            }
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(format!(
                "service '{}' not available after {timeout:?} (state: {})",
                self.inner.name,
                self.state()
            )),
        }
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
