//! Heartbeat Monitor
//!
//! Counts heartbeat intervals that pass without any inbound traffic. The
//! supervisor calls [`HeartbeatMonitor::on_tick`] once per interval and
//! [`HeartbeatMonitor::record_activity`] for every inbound frame.

use std::time::Duration;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between pings.
    pub interval: Duration,
    /// Consecutive silent intervals that count as a dead connection.
    pub missed_limit: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            missed_limit: 2,
        }
    }
}

/// What to do at an interval boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Send a ping and keep going.
    SendPing,
    /// Connection is considered dead.
    Timeout,
}

/// Per-connection heartbeat bookkeeping.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    missed_limit: u32,
    missed: u32,
    seen_activity: bool,
}

impl HeartbeatMonitor {
    /// Create a monitor for a fresh connection.
    #[must_use]
    pub const fn new(config: &HeartbeatConfig) -> Self {
        Self {
            missed_limit: config.missed_limit,
            missed: 0,
            seen_activity: false,
        }
    }

    /// Record inbound traffic of any kind.
    pub const fn record_activity(&mut self) {
        self.seen_activity = true;
    }

    /// Advance one interval.
    pub const fn on_tick(&mut self) -> HeartbeatEvent {
        if self.seen_activity {
            self.seen_activity = false;
            self.missed = 0;
            return HeartbeatEvent::SendPing;
        }

        self.missed = self.missed.saturating_add(1);
        if self.missed_limit > 0 && self.missed >= self.missed_limit {
            HeartbeatEvent::Timeout
        } else {
            HeartbeatEvent::SendPing
        }
    }

    /// Silent intervals so far.
    #[must_use]
    pub const fn missed(&self) -> u32 {
        self.missed
    }
}
