//! Quote Hub
//!
//! The consumer-facing surface: subscribe to symbols, read views, attach
//! update callbacks and observe connectivity. Every method returns
//! immediately; upstream work is handed to the background tasks through
//! the intent channel.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::delivery::{QuoteUpdate, UpdateCallback};
use super::supervisor::SubscriptionIntent;
use super::{SyncState, monotonic_now};
use crate::domain::connection::ConnectionState;
use crate::domain::quote::{QuoteView, Symbol, SymbolError};
use crate::domain::subscription::{HandleId, SymbolInterest};
use crate::infrastructure::metrics;

// =============================================================================
// Handle & Errors
// =============================================================================

/// Opaque token returned by [`QuoteHub::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(HandleId);

impl SubscriptionHandle {
    pub(crate) const fn from_id(id: HandleId) -> Self {
        Self(id)
    }

    /// Raw identifier, for logging.
    #[must_use]
    pub const fn id(self) -> HandleId {
        self.0
    }
}

/// Usage errors reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsumerError {
    /// A symbol failed validation.
    #[error(transparent)]
    InvalidSymbol(#[from] SymbolError),

    /// `subscribe` was called with no symbols.
    #[error("subscription must contain at least one symbol")]
    EmptySubscription,

    /// The hub has been shut down.
    #[error("quote hub is shut down")]
    ShutDown,

    /// The handle was never issued or has been unsubscribed.
    #[error("unknown subscription handle {0}")]
    UnknownHandle(HandleId),
}

/// Point-in-time counts for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStats {
    /// Live consumer handles.
    pub handles: usize,
    /// Symbols currently tracked by the cache.
    pub tracked_symbols: usize,
    /// Symbols with refcount > 0.
    pub active_symbols: usize,
    /// Symbols waiting out the unsubscribe debounce.
    pub pending_unsubscribes: usize,
    /// Published connection state.
    pub connection_state: ConnectionState,
}

// =============================================================================
// Hub
// =============================================================================

/// Consumer API over the shared quote state.
///
/// Cheap to clone; all clones share the same state.
#[derive(Debug, Clone)]
pub struct QuoteHub {
    state: Arc<SyncState>,
    intents: mpsc::UnboundedSender<SubscriptionIntent>,
    connection: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    started_at: Instant,
}

impl QuoteHub {
    /// Create a hub over shared state.
    #[must_use]
    pub fn new(
        state: Arc<SyncState>,
        intents: mpsc::UnboundedSender<SubscriptionIntent>,
        connection: watch::Receiver<ConnectionState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state,
            intents,
            connection,
            cancel,
            started_at: Instant::now(),
        }
    }

    /// Subscribe to a set of symbols.
    ///
    /// Every call returns a new handle. Overlapping symbol sets across
    /// handles share one upstream subscription.
    ///
    /// # Errors
    ///
    /// - [`ConsumerError::ShutDown`] after [`QuoteHub::shutdown`]
    /// - [`ConsumerError::InvalidSymbol`] for a malformed symbol
    /// - [`ConsumerError::EmptySubscription`] when no symbols are given
    pub fn subscribe<I, S>(&self, symbols: I) -> Result<SubscriptionHandle, ConsumerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.cancel.is_cancelled() {
            return Err(ConsumerError::ShutDown);
        }

        let symbols = symbols
            .into_iter()
            .map(|raw| Symbol::parse(raw.as_ref()))
            .collect::<Result<BTreeSet<_>, _>>()?;
        if symbols.is_empty() {
            return Err(ConsumerError::EmptySubscription);
        }

        let interests: Vec<SymbolInterest> = symbols
            .iter()
            .map(|symbol| {
                let class = self.state.classes.resolve(symbol);
                SymbolInterest::new(symbol.clone(), class.name.clone(), class.push_enabled)
            })
            .collect();

        let id = self.next_handle_id();
        {
            let mut mux = self.state.multiplexer.lock();
            let subscribe = mux.add_interest(id, &interests);

            for interest in &interests {
                let class = self
                    .state
                    .classes
                    .get(&interest.class)
                    .unwrap_or_else(|| self.state.classes.default_class());
                self.state.cache.track(&interest.symbol, class.freshness_window);
            }

            if !subscribe.is_empty() {
                self.send_intent(SubscriptionIntent::Subscribe(subscribe));
            }
        }
        self.state.registry.register(id, symbols);

        tracing::debug!(handle = id, symbols = interests.len(), "Consumer subscribed");
        self.record_gauges();

        Ok(SubscriptionHandle(id))
    }

    /// Release a handle.
    ///
    /// Always succeeds; releasing an already released handle does nothing.
    /// Upstream unsubscription happens after the debounce window.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        if !self.state.registry.remove(handle.0) {
            return;
        }

        let scheduled = self
            .state
            .multiplexer
            .lock()
            .remove_interest(handle.0, monotonic_now());

        tracing::debug!(
            handle = handle.0,
            released = scheduled.len(),
            "Consumer unsubscribed"
        );
        self.record_gauges();
    }

    /// Current view of a symbol.
    ///
    /// Returns `None` only if the symbol was never subscribed.
    #[must_use]
    pub fn get_quote(&self, symbol: &str) -> Option<QuoteView> {
        self.state.cache.read(symbol)
    }

    /// Attach a callback to a handle, replacing any previous one.
    ///
    /// The callback runs on the ingest worker at most once per batching
    /// tick, so it should return quickly.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::UnknownHandle`] if the handle is not live.
    pub fn on_update<F>(&self, handle: &SubscriptionHandle, callback: F) -> Result<(), ConsumerError>
    where
        F: Fn(&QuoteUpdate) + Send + Sync + 'static,
    {
        let callback: UpdateCallback = Arc::new(callback);
        if self.state.registry.set_callback(handle.0, callback) {
            Ok(())
        } else {
            Err(ConsumerError::UnknownHandle(handle.0))
        }
    }

    /// Published connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    /// Receiver notified on every connection state transition.
    #[must_use]
    pub fn watch_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.clone()
    }

    /// Number of live handles interested in a symbol.
    #[must_use]
    pub fn ref_count(&self, symbol: &str) -> usize {
        self.state.multiplexer.lock().ref_count(symbol)
    }

    /// Clear every session baseline.
    pub fn reset_session(&self) {
        self.state.cache.reset_session();
        tracing::info!("Session baselines reset");
    }

    /// Ask the supervisor to connect even without subscriptions.
    pub fn start(&self) {
        self.send_intent(SubscriptionIntent::Start);
    }

    /// Stop every background task. Pending intents are discarded.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Whether [`QuoteHub::shutdown`] has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Time since the hub was created.
    #[must_use]
    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Current counts.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        let mux = self.state.multiplexer.lock().stats();
        HubStats {
            handles: self.state.registry.len(),
            tracked_symbols: self.state.cache.tracked_count(),
            active_symbols: mux.active_symbols,
            pending_unsubscribes: mux.pending_unsubscribes,
            connection_state: self.connection_state(),
        }
    }

    fn next_handle_id(&self) -> HandleId {
        loop {
            let id = Uuid::new_v4().as_u64_pair().0;
            if !self.state.registry.contains(id) {
                return id;
            }
        }
    }

    fn send_intent(&self, intent: SubscriptionIntent) {
        if self.intents.send(intent).is_err() {
            tracing::debug!("Supervisor gone, intent dropped");
        }
    }

    fn record_gauges(&self) {
        metrics::set_handles(self.state.registry.len());
        metrics::set_tracked_symbols(self.state.cache.tracked_count());
    }
}
