//! Connection state tracking
//!
//! The state has two values and changes only through the transport's
//! connection callbacks. [`ConnectionStateMachine::transition`] is the single
//! setter; logging and counters fire only when the value actually changes.

use crate::observability::ClientMetrics;
use crate::transport::ConnectionObserver;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{info, warn};

/// Connection state visible to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connected => f.write_str("connected"),
        }
    }
}

/// Events that move the state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Lost,
}

/// Pure transition function
pub fn next_state(_current: ConnectionState, event: ConnectionEvent) -> ConnectionState {
    match event {
        ConnectionEvent::Connected => ConnectionState::Connected,
        ConnectionEvent::Lost => ConnectionState::Disconnected,
    }
}

/// State holder owned by the client and driven by the transport
pub struct ConnectionStateMachine {
    client_id: String,
    state_tx: watch::Sender<ConnectionState>,
    last_cause: Mutex<Option<String>>,
    metrics: Arc<ClientMetrics>,
}

impl ConnectionStateMachine {
    pub fn new(client_id: impl Into<String>, metrics: Arc<ClientMetrics>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            client_id: client_id.into(),
            state_tx,
            last_cause: Mutex::new(None),
            metrics,
        }
    }

    pub fn current(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Receiver that observes every transition
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Cause recorded by the most recent loss, if any
    pub fn last_cause(&self) -> Option<String> {
        self.last_cause
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply `event` and return the previous state
    fn transition(&self, event: ConnectionEvent) -> ConnectionState {
        let next = next_state(self.current(), event);
        self.state_tx.send_replace(next)
    }
}

impl ConnectionObserver for ConnectionStateMachine {
    fn on_connect(&self) {
        if self.transition(ConnectionEvent::Connected) != ConnectionState::Connected {
            self.metrics.connection_established();
            info!(client_id = %self.client_id, "Client connected");
        }
    }

    fn on_lost(&self, cause: &str) {
        *self
            .last_cause
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(cause.to_string());

        if self.transition(ConnectionEvent::Lost) == ConnectionState::Connected {
            self.metrics.connection_lost();
            warn!(client_id = %self.client_id, cause = %cause, "Client disconnected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> (ConnectionStateMachine, Arc<ClientMetrics>) {
        let metrics = Arc::new(ClientMetrics::new());
        (ConnectionStateMachine::new("t1", metrics.clone()), metrics)
    }

    #[test]
    fn test_initial_state_is_disconnected() {
        let (machine, _) = machine();
        assert_eq!(machine.current(), ConnectionState::Disconnected);
        assert_eq!(machine.last_cause(), None);
    }

    #[test]
    fn test_next_state_ignores_current() {
        for current in [ConnectionState::Connected, ConnectionState::Disconnected] {
            assert_eq!(
                next_state(current, ConnectionEvent::Connected),
                ConnectionState::Connected
            );
            assert_eq!(
                next_state(current, ConnectionEvent::Lost),
                ConnectionState::Disconnected
            );
        }
    }

    #[test]
    fn test_connect_is_idempotent() {
        let (machine, metrics) = machine();
        machine.on_connect();
        machine.on_connect();

        assert_eq!(machine.current(), ConnectionState::Connected);
        assert_eq!(metrics.snapshot().connections_established, 1);
    }

    #[test]
    fn test_lost_records_cause() {
        let (machine, metrics) = machine();
        machine.on_connect();
        machine.on_lost("network unreachable");

        assert_eq!(machine.current(), ConnectionState::Disconnected);
        assert_eq!(machine.last_cause().as_deref(), Some("network unreachable"));
        assert_eq!(metrics.snapshot().connections_lost, 1);

        machine.on_lost("again");
        assert_eq!(metrics.snapshot().connections_lost, 1);
        assert_eq!(machine.last_cause().as_deref(), Some("again"));
    }

    #[tokio::test]
    async fn test_watchers_see_transitions() {
        let (machine, _) = machine();
        let mut rx = machine.subscribe();

        machine.on_connect();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ConnectionState::Connected);

        machine.on_lost("bye");
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
    }
}
