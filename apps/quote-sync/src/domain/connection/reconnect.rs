//! Reconnection Policy
//!
//! Exponential backoff with full jitter: each delay is drawn uniformly from
//! `[1ms, ceiling]`, where the ceiling starts at `initial_delay` and grows by
//! `multiplier` up to `max_delay`.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Ceiling for the first delay.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Growth factor applied to the ceiling after each attempt.
    pub multiplier: f64,
    /// Maximum number of reconnection attempts (0 = unlimited).
    pub max_attempts: u32,
    /// Draw each delay uniformly below the ceiling.
    pub full_jitter: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 0,
            full_jitter: true,
        }
    }
}

/// Backoff state for one supervisor.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    ceiling: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let ceiling = config.initial_delay;
        Self {
            config,
            ceiling,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt.
    ///
    /// Returns `None` once `max_attempts` is exhausted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }

        self.attempt_count += 1;

        let ceiling = self.ceiling.min(self.config.max_delay);
        let delay = if self.config.full_jitter {
            full_jitter(ceiling)
        } else {
            ceiling
        };

        self.ceiling = self.grow(ceiling);
        Some(delay)
    }

    /// Reset after a successful connection.
    pub const fn reset(&mut self) {
        self.ceiling = self.config.initial_delay;
        self.attempt_count = 0;
    }

    /// Attempts since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    fn grow(&self, ceiling: Duration) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let scaled = (ceiling.as_millis() as f64 * self.config.multiplier).round();
        let max_millis = self.config.max_delay.as_millis();

        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                (scaled as u128).min(max_millis)
            }
        } else {
            max_millis
        };

        Duration::from_millis(u64::try_from(next_millis).unwrap_or(u64::MAX))
    }
}

fn full_jitter(ceiling: Duration) -> Duration {
    let max_millis = u64::try_from(ceiling.as_millis())
        .unwrap_or(u64::MAX)
        .max(1);
    Duration::from_millis(rand::rng().random_range(1..=max_millis))
}
