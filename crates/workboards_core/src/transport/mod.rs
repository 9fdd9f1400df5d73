//! Realtime transport supervision.
//!
//! [`TransportSupervisor`] owns the push connection's state and decides
//! whether the fallback poller runs: polling is suspended the moment the
//! connection reaches `Connected` and resumed the moment it leaves it.
//!
//! The WebSocket client itself lives in [`push_channel`] (native only).

#[cfg(feature = "native-sync")]
pub mod push_channel;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// State of the realtime push connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// Change to the fallback poller requested by a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingChange {
    /// Start polling every poll interval.
    Resume,
    /// Stop polling.
    Suspend,
}

/// Timing for the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportTiming {
    /// Interval between liveness probes while connected.
    pub heartbeat_interval: Duration,
    /// How long a probe may take before the connection counts as half-open.
    pub heartbeat_timeout: Duration,
    /// Interval between full refetches while not connected.
    pub poll_interval: Duration,
}

impl Default for TransportTiming {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(15),
            heartbeat_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Connection state machine plus polling arbitration.
#[derive(Debug, Clone)]
pub struct TransportSupervisor {
    state: ConnectionState,
    polling: bool,
    timing: TransportTiming,
}

impl TransportSupervisor {
    /// Start disconnected, with polling active.
    pub fn new(timing: TransportTiming) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            polling: true,
            timing,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the fallback poller should be running.
    pub fn polling_active(&self) -> bool {
        self.polling
    }

    /// Transport timing.
    pub fn timing(&self) -> TransportTiming {
        self.timing
    }

    /// Record a connection state change and report how polling must change.
    pub fn transition(&mut self, next: ConnectionState) -> Option<PollingChange> {
        if next != self.state {
            log::info!("[Transport] {} -> {}", self.state, next);
        }
        self.state = next;

        let should_poll = next != ConnectionState::Connected;
        if should_poll == self.polling {
            return None;
        }
        self.polling = should_poll;
        if should_poll {
            log::info!("[Transport] push channel down, polling every {:?}", self.timing.poll_interval);
            Some(PollingChange::Resume)
        } else {
            log::info!("[Transport] push channel live, polling suspended");
            Some(PollingChange::Suspend)
        }
    }
}

impl Default for TransportSupervisor {
    fn default() -> Self {
        Self::new(TransportTiming::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_polling_while_disconnected() {
        let sup = TransportSupervisor::default();
        assert_eq!(sup.state(), ConnectionState::Disconnected);
        assert!(sup.polling_active());
    }

    #[test]
    fn test_connected_suspends_polling() {
        let mut sup = TransportSupervisor::default();
        assert_eq!(sup.transition(ConnectionState::Connecting), None);
        assert!(sup.polling_active());
        assert_eq!(
            sup.transition(ConnectionState::Connected),
            Some(PollingChange::Suspend)
        );
        assert!(!sup.polling_active());
    }

    #[test]
    fn test_leaving_connected_resumes_polling() {
        let mut sup = TransportSupervisor::default();
        sup.transition(ConnectionState::Connected);
        assert_eq!(
            sup.transition(ConnectionState::Disconnected),
            Some(PollingChange::Resume)
        );
        assert_eq!(sup.transition(ConnectionState::Connecting), None);
        assert!(sup.polling_active());
    }

    #[test]
    fn test_repeated_connected_is_noop() {
        let mut sup = TransportSupervisor::default();
        sup.transition(ConnectionState::Connected);
        assert_eq!(sup.transition(ConnectionState::Connected), None);
    }
}
