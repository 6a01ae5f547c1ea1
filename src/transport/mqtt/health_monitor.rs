//! Reconnection decisions and state transitions
//!
//! Pure functions consumed by the connection supervisor in [`super::client`].

use super::connection::{ConnectionState, ReconnectConfig};
use std::time::Duration;
use tracing::{error, info, warn};

/// Extra time granted beyond the backoff budget while waiting for the first ConnAck
const CONNACK_GRACE: Duration = Duration::from_secs(30);

/// Connection events that drive state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    ConnAckReceived,
    DisconnectedByBroker,
    NetworkError(String),
    ReconnectionStarted(u32),
    PermanentFailure(String),
    ClosedByClient,
}

/// Outcome of asking whether to reconnect
#[derive(Debug, PartialEq)]
pub enum ReconnectionDecision {
    Proceed { attempt: u32, delay_ms: u64 },
    AbortShutdownRequested,
    AbortMaxAttemptsExceeded,
}

pub struct HealthMonitor;

impl HealthMonitor {
    /// Decide whether another reconnection attempt should be made
    pub fn should_attempt_reconnection(
        attempts_so_far: u32,
        config: &ReconnectConfig,
        shutdown_requested: bool,
    ) -> ReconnectionDecision {
        if shutdown_requested {
            return ReconnectionDecision::AbortShutdownRequested;
        }
        if config
            .max_attempts
            .is_some_and(|max| attempts_so_far >= max)
        {
            return ReconnectionDecision::AbortMaxAttemptsExceeded;
        }

        let attempt = attempts_so_far + 1;
        ReconnectionDecision::Proceed {
            attempt,
            delay_ms: config.backoff_delay(attempt),
        }
    }

    /// How long `connect` waits for the first ConnAck
    pub fn connection_timeout(config: &ReconnectConfig) -> Duration {
        match config.max_total_delay() {
            Some(total) => Duration::from_millis(total) + CONNACK_GRACE,
            None => Duration::from_secs(60),
        }
    }

    /// State that follows an event
    pub fn next_state(event: ConnectionEvent) -> ConnectionState {
        match event {
            ConnectionEvent::ConnAckReceived => ConnectionState::Connected,
            ConnectionEvent::DisconnectedByBroker => {
                ConnectionState::Disconnected("Broker disconnected".to_string())
            }
            ConnectionEvent::NetworkError(reason) => ConnectionState::Disconnected(reason),
            ConnectionEvent::ReconnectionStarted(attempt) => ConnectionState::Reconnecting(attempt),
            ConnectionEvent::PermanentFailure(reason) => {
                ConnectionState::PermanentlyDisconnected(reason)
            }
            ConnectionEvent::ClosedByClient => {
                ConnectionState::Disconnected("Client disconnected".to_string())
            }
        }
    }

    /// Publishing and subscribing require an acknowledged connection
    pub fn can_publish(state: &ConnectionState) -> bool {
        matches!(state, ConnectionState::Connected)
    }

    /// Log a transition at a level matching its severity
    pub fn log_transition(from: &ConnectionState, to: &ConnectionState) {
        match (from, to) {
            (ConnectionState::Reconnecting(attempt), ConnectionState::Connected) => {
                info!(attempt, "MQTT reconnection successful");
            }
            (_, ConnectionState::Connected) => info!("MQTT connection established"),
            (ConnectionState::Connected, ConnectionState::Disconnected(reason)) => {
                warn!(reason = %reason, "MQTT connection lost");
            }
            (_, ConnectionState::PermanentlyDisconnected(reason)) => {
                error!(reason = %reason, "MQTT connection permanently failed");
            }
            _ => info!(from = ?from, to = ?to, "MQTT connection state changed"),
        }
    }
}
