//! Cache connectivity status cell
//!
//! Owned by the gateway and written only from connection lifecycle events.
//! Reads are advisory: a connection may drop between the check and the
//! command, so the gateway stays exception-safe regardless of the flag.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// Connection state as seen by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Initial handshake in progress
    Connecting,
    /// Commands may be issued
    Ready,
    /// Connection dropped, client is reconnecting
    Reconnecting,
    /// Last attempt failed
    Errored,
}

impl ConnectionState {
    /// Check if commands should be issued in this state
    pub fn is_available(&self) -> bool {
        matches!(self, ConnectionState::Ready)
    }
}

/// Lifecycle event reported by the cache client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Connected,
    Ready,
    Error,
    Reconnecting,
}

/// Thread-safe, shareable connectivity flag
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    state: Arc<RwLock<ConnectionState>>,
}

impl ConnectionStatus {
    /// New status in the `Connecting` state
    pub fn new() -> Self {
        Self::with_state(ConnectionState::Connecting)
    }

    /// New status in the given state
    pub fn with_state(state: ConnectionState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Check if commands should be issued
    pub fn is_available(&self) -> bool {
        self.state().is_available()
    }

    /// Apply a lifecycle event and return the resulting state
    pub fn record(&self, event: LifecycleEvent) -> ConnectionState {
        let next = match event {
            LifecycleEvent::Connected | LifecycleEvent::Ready => ConnectionState::Ready,
            LifecycleEvent::Error => ConnectionState::Errored,
            LifecycleEvent::Reconnecting => ConnectionState::Reconnecting,
        };

        let mut state = self.state.write();
        if *state != next {
            tracing::info!(from = ?*state, to = ?next, "Cache connection state changed");
        }
        *state = next;
        next
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let status = ConnectionStatus::new();
        assert_eq!(status.state(), ConnectionState::Connecting);
        assert!(!status.is_available());

        assert_eq!(status.record(LifecycleEvent::Connected), ConnectionState::Ready);
        assert!(status.is_available());

        status.record(LifecycleEvent::Error);
        assert!(!status.is_available());

        status.record(LifecycleEvent::Reconnecting);
        assert_eq!(status.state(), ConnectionState::Reconnecting);

        status.record(LifecycleEvent::Ready);
        assert!(status.is_available());
    }

    #[test]
    fn test_clones_share_state() {
        let status = ConnectionStatus::new();
        let observer = status.clone();
        status.record(LifecycleEvent::Ready);
        assert!(observer.is_available());
    }
}
