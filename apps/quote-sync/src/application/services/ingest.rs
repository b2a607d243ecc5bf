//! Ingest Worker
//!
//! The single task that applies observations from both sources to the
//! quote cache. Once per batching tick it notifies consumers about the
//! symbols that changed since the previous tick and expires debounced
//! unsubscriptions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::supervisor::SubscriptionIntent;
use super::{SyncState, monotonic_now};
use crate::domain::cache::IngestOutcome;
use crate::domain::quote::{QuoteRecord, Symbol};
use crate::infrastructure::metrics;

/// Sole writer of the quote cache.
pub struct IngestWorker {
    state: Arc<SyncState>,
    observations: mpsc::Receiver<QuoteRecord>,
    intents: mpsc::UnboundedSender<SubscriptionIntent>,
    batch_window: Duration,
    dirty: HashSet<Symbol>,
    cancel: CancellationToken,
}

impl IngestWorker {
    /// Create a worker.
    #[must_use]
    pub fn new(
        state: Arc<SyncState>,
        observations: mpsc::Receiver<QuoteRecord>,
        intents: mpsc::UnboundedSender<SubscriptionIntent>,
        batch_window: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state,
            observations,
            intents,
            batch_window,
            dirty: HashSet::new(),
            cancel,
        }
    }

    /// Run until cancelled or every observation sender is gone.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.batch_window);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.flush();
                    self.expire_unsubscribes();
                }
                record = self.observations.recv() => match record {
                    Some(record) => {
                        self.apply(record);
                    }
                    None => break,
                },
            }
        }

        tracing::info!("Ingest worker stopped");
    }

    /// Apply one observation to the cache.
    pub fn apply(&mut self, record: QuoteRecord) -> IngestOutcome {
        let symbol = record.symbol().clone();
        let source = record.source();
        let outcome = self.state.cache.ingest(record);

        match outcome {
            IngestOutcome::Accepted | IngestOutcome::Enriched => {
                metrics::record_observation_accepted(source);
                self.dirty.insert(symbol);
            }
            IngestOutcome::Rejected(reason) => {
                tracing::debug!(
                    symbol = %symbol,
                    source = source.as_str(),
                    reason = reason.as_str(),
                    "Observation rejected"
                );
                metrics::record_observation_rejected(reason);
            }
        }

        outcome
    }

    /// Deliver one coalesced callback per affected handle.
    ///
    /// Returns the number of callbacks invoked.
    pub fn flush(&mut self) -> usize {
        if self.dirty.is_empty() {
            return 0;
        }

        let changed: HashMap<Symbol, _> = self
            .dirty
            .drain()
            .filter_map(|symbol| {
                let view = self.state.cache.read(symbol.as_str())?;
                Some((symbol, view))
            })
            .collect();

        let delivered = self.state.registry.deliver(&changed);
        if delivered > 0 {
            metrics::record_callbacks_delivered(delivered);
        }
        delivered
    }

    /// Evict symbols whose unsubscribe debounce has elapsed and ask the
    /// supervisor to unsubscribe the push-enabled ones.
    pub fn expire_unsubscribes(&self) -> Vec<Symbol> {
        let mut mux = self.state.multiplexer.lock();
        let expired = mux.drain_expired(monotonic_now());
        if expired.is_empty() {
            return Vec::new();
        }

        for interest in &expired {
            self.state.cache.evict(&interest.symbol);
        }

        let upstream: Vec<Symbol> = expired
            .iter()
            .filter(|interest| interest.push_enabled)
            .map(|interest| interest.symbol.clone())
            .collect();
        if !upstream.is_empty() && self.intents.send(SubscriptionIntent::Unsubscribe(upstream)).is_err()
        {
            tracing::debug!("Supervisor gone, unsubscribe intent dropped");
        }
        drop(mux);

        tracing::debug!(count = expired.len(), "Debounced unsubscribes expired");
        metrics::set_tracked_symbols(self.state.cache.tracked_count());

        expired.into_iter().map(|interest| interest.symbol).collect()
    }
}
