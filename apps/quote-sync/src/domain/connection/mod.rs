//! Connection Lifecycle
//!
//! Pure state machine for the push connection, plus the backoff and
//! heartbeat policies the supervisor drives it with. Nothing here sleeps
//! or touches the network; timers are fed in as events so the lifecycle
//! can be tested with a fake clock.

pub mod heartbeat;
pub mod reconnect;

use serde::Serialize;

// =============================================================================
// States
// =============================================================================

/// Internal phase of the push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Idle, waiting for a start or first subscribe.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Handshake succeeded, frames flowing.
    Connected,
    /// Waiting out a backoff delay.
    Reconnecting,
    /// Terminal.
    ShutDown,
}

/// Connectivity as published to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected and not trying.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Live push data available.
    Connected,
    /// Reconnect pending after a failure.
    Reconnecting,
    /// Repeated failures; consumers should rely on snapshot data.
    Degraded,
    /// Shut down for good.
    ShutDown,
}

impl ConnectionState {
    /// Label used in logs and the health endpoint.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Degraded => "degraded",
            Self::ShutDown => "shut_down",
        }
    }

    /// Numeric encoding for the state gauge.
    #[must_use]
    pub const fn as_gauge(self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Connected => 2.0,
            Self::Reconnecting => 3.0,
            Self::Degraded => 4.0,
            Self::ShutDown => 5.0,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Events
// =============================================================================

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Explicit start or first subscribe intent.
    Start,
    /// Handshake completed.
    Connected,
    /// Handshake failed, transport error, server close or heartbeat timeout.
    Failed,
    /// Backoff delay elapsed.
    BackoffElapsed,
    /// Retry budget exhausted.
    GiveUp,
    /// Cancellation.
    Shutdown,
}

/// Rejected transition. Indicates a supervisor bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition from {from:?} on {event:?}")]
pub struct TransitionError {
    /// Phase the machine was in.
    pub from: ConnectionPhase,
    /// Event that was rejected.
    pub event: ConnectionEvent,
}

// =============================================================================
// State Machine
// =============================================================================

/// Connection lifecycle state machine.
///
/// ```text
/// Disconnected --Start--> Connecting --Connected--> Connected
///      ^                     |  ^                      |
///      |                 Failed  BackoffElapsed      Failed
///      |                     v  |                      |
///      +------GiveUp------ Reconnecting <--------------+
///
/// any --Shutdown--> ShutDown
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionFsm {
    phase: ConnectionPhase,
    consecutive_failures: u32,
    degraded_after: u32,
}

impl ConnectionFsm {
    /// Create a machine that reports `Degraded` after `degraded_after`
    /// consecutive failures (0 disables the degraded state).
    #[must_use]
    pub const fn new(degraded_after: u32) -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            consecutive_failures: 0,
            degraded_after,
        }
    }

    /// Apply an event.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if the event is not valid in the
    /// current phase. The machine is left unchanged.
    pub fn apply(&mut self, event: ConnectionEvent) -> Result<ConnectionState, TransitionError> {
        use ConnectionEvent as E;
        use ConnectionPhase as P;

        let next = match (self.phase, event) {
            (_, E::Shutdown) => P::ShutDown,
            (P::Disconnected, E::Start) | (P::Reconnecting, E::BackoffElapsed) => P::Connecting,
            (P::Connecting, E::Connected) => {
                self.consecutive_failures = 0;
                P::Connected
            }
            (P::Connecting | P::Connected, E::Failed) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                P::Reconnecting
            }
            (P::Reconnecting, E::GiveUp) => P::Disconnected,
            (from, event) => return Err(TransitionError { from, event }),
        };

        self.phase = next;
        Ok(self.state())
    }

    /// Current internal phase.
    #[must_use]
    pub const fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Failures since the last successful handshake.
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Published state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        let degraded =
            self.degraded_after > 0 && self.consecutive_failures >= self.degraded_after;

        match self.phase {
            ConnectionPhase::Disconnected => ConnectionState::Disconnected,
            ConnectionPhase::Connected => ConnectionState::Connected,
            ConnectionPhase::ShutDown => ConnectionState::ShutDown,
            ConnectionPhase::Connecting | ConnectionPhase::Reconnecting if degraded => {
                ConnectionState::Degraded
            }
            ConnectionPhase::Connecting => ConnectionState::Connecting,
            ConnectionPhase::Reconnecting => ConnectionState::Reconnecting,
        }
    }
}

impl Default for ConnectionFsm {
    fn default() -> Self {
        Self::new(5)
    }
}
