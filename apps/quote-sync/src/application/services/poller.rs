//! Snapshot Poller
//!
//! One timer loop per symbol class. Each tick fetches the class's active
//! symbols from the snapshot source and forwards the results to the ingest
//! worker. Polling ignores the push connection state entirely.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::SyncState;
use crate::application::ports::{SnapshotRequest, SnapshotSource};
use crate::domain::classes::SymbolClass;
use crate::domain::quote::{QuoteRecord, QuoteSource, Symbol};
use crate::infrastructure::metrics;

/// Result of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No active symbols in the class.
    Idle,
    /// Fetch succeeded; this many records were forwarded.
    Forwarded(usize),
    /// Fetch failed; consecutive failure count so far.
    Failed(u32),
}

/// Consecutive-failure tracking for one class.
#[derive(Debug, Default)]
struct ClassHealth {
    consecutive_failures: u32,
    degraded: bool,
}

/// Periodic snapshot fetcher.
#[derive(Clone)]
pub struct SnapshotPoller {
    state: Arc<SyncState>,
    source: Arc<dyn SnapshotSource>,
    observations: mpsc::Sender<QuoteRecord>,
    failure_threshold: u32,
    cancel: CancellationToken,
}

impl SnapshotPoller {
    /// Create a poller.
    #[must_use]
    pub fn new(
        state: Arc<SyncState>,
        source: Arc<dyn SnapshotSource>,
        observations: mpsc::Sender<QuoteRecord>,
        failure_threshold: u32,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state,
            source,
            observations,
            failure_threshold,
            cancel,
        }
    }

    /// Spawn one polling task per configured class.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let classes: Vec<SymbolClass> = self.state.classes.iter().cloned().collect();
        classes
            .into_iter()
            .map(|class| {
                let poller = self.clone();
                tokio::spawn(async move { poller.run_class(class).await })
            })
            .collect()
    }

    async fn run_class(self, class: SymbolClass) {
        let mut ticker = tokio::time::interval(class.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut health = ClassHealth::default();

        tracing::debug!(
            class = %class.name,
            interval_ms = u64::try_from(class.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "Snapshot polling started"
        );

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll_class(&class, &mut health).await;
                }
            }
        }
    }

    /// Poll one class once, outside the timer loop.
    pub async fn poll_once(&self, class: &SymbolClass) -> PollOutcome {
        let mut health = ClassHealth::default();
        self.poll_class(class, &mut health).await
    }

    async fn poll_class(&self, class: &SymbolClass, health: &mut ClassHealth) -> PollOutcome {
        let symbols = self
            .state
            .multiplexer
            .lock()
            .active_symbols_in_class(&class.name);
        if symbols.is_empty() {
            return PollOutcome::Idle;
        }

        let request = SnapshotRequest {
            symbols,
            range: class.range.clone(),
        };

        let started = std::time::Instant::now();
        let result = self.source.fetch(&request).await;
        metrics::record_snapshot_fetch_duration(&class.name, started.elapsed());

        match result {
            Ok(records) => {
                if health.degraded {
                    tracing::info!(class = %class.name, "Snapshot source recovered");
                    metrics::set_snapshot_degraded(&class.name, false);
                }
                health.consecutive_failures = 0;
                health.degraded = false;

                let forwarded = self.forward(&request.symbols, records).await;
                PollOutcome::Forwarded(forwarded)
            }
            Err(e) => {
                health.consecutive_failures = health.consecutive_failures.saturating_add(1);
                metrics::record_snapshot_failure(&class.name);

                if !health.degraded && health.consecutive_failures >= self.failure_threshold {
                    health.degraded = true;
                    metrics::set_snapshot_degraded(&class.name, true);
                    tracing::warn!(
                        class = %class.name,
                        failures = health.consecutive_failures,
                        error = %e,
                        "Snapshot source failing persistently"
                    );
                } else {
                    tracing::debug!(
                        class = %class.name,
                        failures = health.consecutive_failures,
                        error = %e,
                        "Snapshot fetch failed, retrying next tick"
                    );
                }

                PollOutcome::Failed(health.consecutive_failures)
            }
        }
    }

    async fn forward(&self, requested: &[Symbol], records: Vec<QuoteRecord>) -> usize {
        let requested: HashSet<&Symbol> = requested.iter().collect();
        let mut forwarded = 0;

        for record in records {
            if record.source() != QuoteSource::Snapshot || !requested.contains(record.symbol()) {
                tracing::debug!(symbol = %record.symbol(), "Ignoring unrequested snapshot record");
                continue;
            }

            metrics::record_observation_received(QuoteSource::Snapshot);
            if self.observations.send(record).await.is_err() {
                tracing::debug!("Ingest worker gone, stopping snapshot forward");
                break;
            }
            forwarded += 1;
        }

        forwarded
    }
}
