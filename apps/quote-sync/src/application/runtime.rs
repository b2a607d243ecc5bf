//! Runtime Wiring
//!
//! Builds the shared state and channels, spawns the ingest worker, the
//! connection supervisor and the snapshot pollers, and hands back the
//! [`QuoteHub`] consumers talk to.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::ports::{PushConnector, SnapshotSource};
use super::services::{ConnectionSupervisor, IngestWorker, QuoteHub, SnapshotPoller, SyncState};
use crate::domain::classes::SymbolClassMap;
use crate::domain::connection::ConnectionState;
use crate::domain::connection::heartbeat::HeartbeatConfig;
use crate::domain::connection::reconnect::ReconnectConfig;

/// Tunables for the background tasks.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Symbol class configuration.
    pub classes: SymbolClassMap,
    /// Delay before a zero-refcount symbol is unsubscribed upstream.
    pub unsubscribe_debounce: Duration,
    /// Callback coalescing window.
    pub batch_window: Duration,
    /// Reconnect backoff.
    pub reconnect: ReconnectConfig,
    /// Heartbeat cadence and timeout.
    pub heartbeat: HeartbeatConfig,
    /// Consecutive push failures before `Degraded` is published.
    pub degraded_after: u32,
    /// Consecutive snapshot failures before a class is flagged degraded.
    pub snapshot_failure_threshold: u32,
    /// Capacity of the observation channel feeding the ingest worker.
    pub observation_buffer: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            classes: SymbolClassMap::default(),
            unsubscribe_debounce: Duration::from_secs(3),
            batch_window: Duration::from_millis(200),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            degraded_after: 5,
            snapshot_failure_threshold: 3,
            observation_buffer: 4_096,
        }
    }
}

/// Shortest timer period handed to the background tasks.
const MIN_PERIOD: Duration = Duration::from_millis(1);

impl RuntimeConfig {
    /// Raise zero timer periods to [`MIN_PERIOD`], since tokio intervals
    /// reject a zero period.
    fn with_valid_periods(mut self) -> Self {
        if self.batch_window < MIN_PERIOD || self.heartbeat.interval < MIN_PERIOD {
            tracing::warn!(
                batch_window_ms = u64::try_from(self.batch_window.as_millis()).unwrap_or(u64::MAX),
                heartbeat_ms = u64::try_from(self.heartbeat.interval.as_millis()).unwrap_or(u64::MAX),
                "Zero timer period raised to 1ms"
            );
        }
        self.batch_window = self.batch_window.max(MIN_PERIOD);
        self.heartbeat.interval = self.heartbeat.interval.max(MIN_PERIOD);
        self.classes = self.classes.with_min_poll_interval(MIN_PERIOD);
        self
    }
}

/// Running quote synchronization core.
#[derive(Debug)]
pub struct QuoteSyncRuntime {
    hub: QuoteHub,
    tasks: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl QuoteSyncRuntime {
    /// Spawn every background task on the current tokio runtime.
    ///
    /// The supervisor stays `Disconnected` until the first push-enabled
    /// subscribe or [`QuoteHub::start`].
    #[must_use]
    pub fn spawn(
        config: RuntimeConfig,
        connector: Arc<dyn PushConnector>,
        snapshot: Arc<dyn SnapshotSource>,
        cancel: CancellationToken,
    ) -> Self {
        let config = config.with_valid_periods();
        let state = Arc::new(SyncState::new(config.classes, config.unsubscribe_debounce));
        let (intent_tx, intent_rx) = mpsc::unbounded_channel();
        let (observation_tx, observation_rx) = mpsc::channel(config.observation_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let hub = QuoteHub::new(Arc::clone(&state), intent_tx.clone(), state_rx, cancel.clone());

        let worker = IngestWorker::new(
            Arc::clone(&state),
            observation_rx,
            intent_tx,
            config.batch_window,
            cancel.clone(),
        );

        let supervisor = ConnectionSupervisor::new(
            Arc::clone(&state),
            connector,
            intent_rx,
            observation_tx.clone(),
            state_tx,
            config.reconnect,
            config.heartbeat,
            config.degraded_after,
            cancel.clone(),
        );

        let poller = SnapshotPoller::new(
            state,
            snapshot,
            observation_tx,
            config.snapshot_failure_threshold,
            cancel.clone(),
        );

        let mut tasks = vec![tokio::spawn(worker.run()), tokio::spawn(supervisor.run())];
        tasks.extend(poller.spawn());

        tracing::info!(tasks = tasks.len(), "Quote sync runtime started");

        Self { hub, tasks, cancel }
    }

    /// Consumer API handle.
    #[must_use]
    pub fn hub(&self) -> QuoteHub {
        self.hub.clone()
    }

    /// Cancel every task and wait for them to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }
        tracing::info!("Quote sync runtime stopped");
    }
}
