//! Quote Sync Configuration Settings
//!
//! Configuration types for the quote sync service, loaded from environment
//! variables. Every timing constant has a default and a `QUOTE_SYNC_*` key.

use std::str::FromStr;
use std::time::Duration;

use crate::application::runtime::RuntimeConfig;
use crate::domain::classes::SymbolClassMap;
use crate::domain::connection::heartbeat::HeartbeatConfig;
use crate::domain::connection::reconnect::ReconnectConfig;
use crate::domain::quote::{Symbol, SymbolError};

/// Push feed settings.
#[derive(Debug, Clone)]
pub struct PushSettings {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: String,
    /// Handshake timeout.
    pub connect_timeout: Duration,
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8765/quotes".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Snapshot source settings.
#[derive(Debug, Clone)]
pub struct SnapshotSettings {
    /// HTTP endpoint.
    pub url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Consecutive failures before a class is flagged degraded.
    pub failure_threshold: u32,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080/api/quotes".to_string(),
            timeout: Duration::from_secs(10),
            failure_threshold: 3,
        }
    }
}

/// Push connection lifecycle settings.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Silent intervals before the connection is considered dead.
    pub heartbeat_missed_limit: u32,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Consecutive failures before `Degraded` is published.
    pub degraded_after_failures: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_missed_limit: 2,
            reconnect_delay_initial: Duration::from_millis(1_000),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0, // Unlimited
            degraded_after_failures: 5,
        }
    }
}

/// Subscription, batching and polling cadence.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Delay before a zero-refcount symbol is unsubscribed upstream.
    pub unsubscribe_debounce: Duration,
    /// Callback coalescing window.
    pub batch_window: Duration,
    /// Poll interval for the crypto class.
    pub crypto_poll_interval: Duration,
    /// Poll interval for the default (equity) class.
    pub default_poll_interval: Duration,
    /// Poll interval for the index class.
    pub index_poll_interval: Duration,
    /// Capacity of the observation channel.
    pub observation_buffer: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            unsubscribe_debounce: Duration::from_millis(3_000),
            batch_window: Duration::from_millis(200),
            crypto_poll_interval: Duration::from_secs(3),
            default_poll_interval: Duration::from_secs(15),
            index_poll_interval: Duration::from_secs(15),
            observation_buffer: 4_096,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// Push feed.
    pub push: PushSettings,
    /// Snapshot source.
    pub snapshot: SnapshotSettings,
    /// Connection lifecycle.
    pub connection: ConnectionSettings,
    /// Cadence.
    pub sync: SyncSettings,
    /// Server ports.
    pub server: ServerSettings,
    /// Symbols the binary subscribes to at startup.
    pub watch_symbols: Vec<Symbol>,
}

impl SyncConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparseable or
    /// out-of-range value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// Unset or blank keys fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is unparseable or out of range.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let push = PushSettings {
            url: env.string("QUOTE_SYNC_PUSH_URL", PushSettings::default().url),
            connect_timeout: env.duration_secs(
                "QUOTE_SYNC_PUSH_CONNECT_TIMEOUT_SECS",
                PushSettings::default().connect_timeout,
            )?,
        };
        if !(push.url.starts_with("ws://") || push.url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue {
                key: "QUOTE_SYNC_PUSH_URL".to_string(),
                value: push.url,
            });
        }

        let snapshot = SnapshotSettings {
            url: env.string("QUOTE_SYNC_SNAPSHOT_URL", SnapshotSettings::default().url),
            timeout: env.duration_secs(
                "QUOTE_SYNC_SNAPSHOT_TIMEOUT_SECS",
                SnapshotSettings::default().timeout,
            )?,
            failure_threshold: env.parse(
                "QUOTE_SYNC_SNAPSHOT_FAILURE_THRESHOLD",
                SnapshotSettings::default().failure_threshold,
            )?,
        };
        if !(snapshot.url.starts_with("http://") || snapshot.url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "QUOTE_SYNC_SNAPSHOT_URL".to_string(),
                value: snapshot.url,
            });
        }

        let connection = ConnectionSettings {
            heartbeat_interval: env.duration_secs(
                "QUOTE_SYNC_HEARTBEAT_INTERVAL_SECS",
                ConnectionSettings::default().heartbeat_interval,
            )?,
            heartbeat_missed_limit: env.positive(
                "QUOTE_SYNC_HEARTBEAT_MISSED_LIMIT",
                ConnectionSettings::default().heartbeat_missed_limit,
            )?,
            reconnect_delay_initial: env.duration_millis(
                "QUOTE_SYNC_RECONNECT_DELAY_INITIAL_MS",
                ConnectionSettings::default().reconnect_delay_initial,
            )?,
            reconnect_delay_max: env.duration_secs(
                "QUOTE_SYNC_RECONNECT_DELAY_MAX_SECS",
                ConnectionSettings::default().reconnect_delay_max,
            )?,
            reconnect_delay_multiplier: env.parse(
                "QUOTE_SYNC_RECONNECT_DELAY_MULTIPLIER",
                ConnectionSettings::default().reconnect_delay_multiplier,
            )?,
            max_reconnect_attempts: env.parse(
                "QUOTE_SYNC_MAX_RECONNECT_ATTEMPTS",
                ConnectionSettings::default().max_reconnect_attempts,
            )?,
            degraded_after_failures: env.parse(
                "QUOTE_SYNC_DEGRADED_AFTER_FAILURES",
                ConnectionSettings::default().degraded_after_failures,
            )?,
        };
        if !(connection.reconnect_delay_multiplier >= 1.0
            && connection.reconnect_delay_multiplier.is_finite())
        {
            return Err(ConfigError::InvalidValue {
                key: "QUOTE_SYNC_RECONNECT_DELAY_MULTIPLIER".to_string(),
                value: connection.reconnect_delay_multiplier.to_string(),
            });
        }

        let sync = SyncSettings {
            unsubscribe_debounce: env.duration_millis_allow_zero(
                "QUOTE_SYNC_UNSUBSCRIBE_DEBOUNCE_MS",
                SyncSettings::default().unsubscribe_debounce,
            )?,
            batch_window: env.duration_millis(
                "QUOTE_SYNC_BATCH_WINDOW_MS",
                SyncSettings::default().batch_window,
            )?,
            crypto_poll_interval: env.duration_secs(
                "QUOTE_SYNC_CRYPTO_POLL_SECS",
                SyncSettings::default().crypto_poll_interval,
            )?,
            default_poll_interval: env.duration_secs(
                "QUOTE_SYNC_DEFAULT_POLL_SECS",
                SyncSettings::default().default_poll_interval,
            )?,
            index_poll_interval: env.duration_secs(
                "QUOTE_SYNC_INDEX_POLL_SECS",
                SyncSettings::default().index_poll_interval,
            )?,
            observation_buffer: env.positive(
                "QUOTE_SYNC_OBSERVATION_BUFFER",
                SyncSettings::default().observation_buffer,
            )?,
        };

        let server = ServerSettings {
            health_port: env.parse(
                "QUOTE_SYNC_HEALTH_PORT",
                ServerSettings::default().health_port,
            )?,
        };

        let watch_symbols = env.symbols("QUOTE_SYNC_WATCH_SYMBOLS")?;

        Ok(Self {
            push,
            snapshot,
            connection,
            sync,
            server,
            watch_symbols,
        })
    }

    /// Build the runtime tunables.
    #[must_use]
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            classes: SymbolClassMap::standard(
                self.sync.crypto_poll_interval,
                self.sync.default_poll_interval,
                self.sync.index_poll_interval,
            ),
            unsubscribe_debounce: self.sync.unsubscribe_debounce,
            batch_window: self.sync.batch_window,
            reconnect: ReconnectConfig {
                initial_delay: self.connection.reconnect_delay_initial,
                max_delay: self.connection.reconnect_delay_max,
                multiplier: self.connection.reconnect_delay_multiplier,
                max_attempts: self.connection.max_reconnect_attempts,
                full_jitter: true,
            },
            heartbeat: HeartbeatConfig {
                interval: self.connection.heartbeat_interval,
                missed_limit: self.connection.heartbeat_missed_limit,
            },
            degraded_after: self.connection.degraded_after_failures,
            snapshot_failure_threshold: self.snapshot.failure_threshold,
            observation_buffer: self.sync.observation_buffer,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Variable could not be parsed or is out of range.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },

    /// A watch symbol is malformed.
    #[error("invalid symbol in {key}: {source}")]
    InvalidSymbol {
        /// Variable name.
        key: String,
        /// Validation failure.
        source: SymbolError,
    },
}

/// Typed access to a key lookup.
struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: String) -> String {
        self.raw(key).unwrap_or(default)
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.raw(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        }
    }

    fn positive<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Default + ToString,
    {
        let value = self.parse(key, default)?;
        if value <= T::default() {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        Ok(value)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let secs = self.positive(key, default.as_secs())?;
        Ok(Duration::from_secs(secs))
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let millis = self.positive(key, millis_of(default))?;
        Ok(Duration::from_millis(millis))
    }

    fn duration_millis_allow_zero(
        &self,
        key: &str,
        default: Duration,
    ) -> Result<Duration, ConfigError> {
        let millis = self.parse(key, millis_of(default))?;
        Ok(Duration::from_millis(millis))
    }

    fn symbols(&self, key: &str) -> Result<Vec<Symbol>, ConfigError> {
        let Some(raw) = self.raw(key) else {
            return Ok(Vec::new());
        };

        raw.split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                Symbol::parse(s).map_err(|source| ConfigError::InvalidSymbol {
                    key: key.to_string(),
                    source,
                })
            })
            .collect()
    }
}

fn millis_of(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<SyncConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        SyncConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.push.url, "ws://127.0.0.1:8765/quotes");
        assert_eq!(config.snapshot.url, "http://127.0.0.1:8080/api/quotes");
        assert_eq!(config.snapshot.failure_threshold, 3);
        assert_eq!(config.connection.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.connection.heartbeat_missed_limit, 2);
        assert_eq!(config.connection.reconnect_delay_initial, Duration::from_secs(1));
        assert_eq!(config.connection.reconnect_delay_max, Duration::from_secs(30));
        assert!((config.connection.reconnect_delay_multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.connection.max_reconnect_attempts, 0);
        assert_eq!(config.connection.degraded_after_failures, 5);
        assert_eq!(config.sync.unsubscribe_debounce, Duration::from_secs(3));
        assert_eq!(config.sync.batch_window, Duration::from_millis(200));
        assert_eq!(config.sync.crypto_poll_interval, Duration::from_secs(3));
        assert_eq!(config.sync.default_poll_interval, Duration::from_secs(15));
        assert_eq!(config.server.health_port, 8083);
        assert!(config.watch_symbols.is_empty());
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("QUOTE_SYNC_PUSH_URL", "wss://feed.example.com/ws"),
            ("QUOTE_SYNC_BATCH_WINDOW_MS", "50"),
            ("QUOTE_SYNC_MAX_RECONNECT_ATTEMPTS", "10"),
            ("QUOTE_SYNC_RECONNECT_DELAY_MULTIPLIER", "1.5"),
            ("QUOTE_SYNC_UNSUBSCRIBE_DEBOUNCE_MS", "0"),
            ("QUOTE_SYNC_WATCH_SYMBOLS", "AAPL, BTCUSDT,,^GSPC"),
        ])
        .unwrap();

        assert_eq!(config.push.url, "wss://feed.example.com/ws");
        assert_eq!(config.sync.batch_window, Duration::from_millis(50));
        assert_eq!(config.connection.max_reconnect_attempts, 10);
        assert_eq!(config.sync.unsubscribe_debounce, Duration::ZERO);
        let watched: Vec<&str> = config.watch_symbols.iter().map(Symbol::as_str).collect();
        assert_eq!(watched, vec!["AAPL", "BTCUSDT", "^GSPC"]);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = config_from(&[("QUOTE_SYNC_HEALTH_PORT", "  ")]).unwrap();
        assert_eq!(config.server.health_port, 8083);
    }

    #[test_case("QUOTE_SYNC_HEALTH_PORT", "eighty" ; "unparseable port")]
    #[test_case("QUOTE_SYNC_BATCH_WINDOW_MS", "0" ; "zero batch window")]
    #[test_case("QUOTE_SYNC_CRYPTO_POLL_SECS", "0" ; "zero poll interval")]
    #[test_case("QUOTE_SYNC_HEARTBEAT_MISSED_LIMIT", "0" ; "zero missed limit")]
    #[test_case("QUOTE_SYNC_RECONNECT_DELAY_MULTIPLIER", "0.5" ; "shrinking multiplier")]
    #[test_case("QUOTE_SYNC_PUSH_URL", "http://not-a-socket" ; "non websocket push url")]
    #[test_case("QUOTE_SYNC_SNAPSHOT_URL", "ftp://x" ; "non http snapshot url")]
    fn rejects_bad_values(key: &str, value: &str) {
        assert!(matches!(
            config_from(&[(key, value)]),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn rejects_bad_watch_symbol() {
        assert!(matches!(
            config_from(&[("QUOTE_SYNC_WATCH_SYMBOLS", "AAPL,no spaces")]),
            Err(ConfigError::InvalidSymbol { .. })
        ));
    }

    #[test]
    fn runtime_config_carries_settings() {
        let config = config_from(&[
            ("QUOTE_SYNC_CRYPTO_POLL_SECS", "5"),
            ("QUOTE_SYNC_DEGRADED_AFTER_FAILURES", "7"),
        ])
        .unwrap();

        let runtime = config.runtime_config();

        assert_eq!(
            runtime.classes.get("crypto").unwrap().poll_interval,
            Duration::from_secs(5)
        );
        assert_eq!(runtime.degraded_after, 7);
        assert_eq!(runtime.heartbeat.missed_limit, 2);
        assert!(runtime.reconnect.full_jitter);
    }
}
