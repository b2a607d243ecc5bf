//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `QuoteHub`: consumer-facing subscribe/read surface
//! - `IngestWorker`: sole writer of the quote cache, batches callbacks
//! - `ConnectionSupervisor`: owns the push connection lifecycle
//! - `SnapshotPoller`: per-class snapshot polling

use std::time::Duration;

use parking_lot::Mutex;

use crate::domain::cache::QuoteCache;
use crate::domain::classes::SymbolClassMap;
use crate::domain::subscription::SubscriptionMultiplexer;

mod delivery;
mod hub;
mod ingest;
mod poller;
mod supervisor;

pub use delivery::{HandleRegistry, QuoteUpdate, UpdateCallback};
pub use hub::{ConsumerError, HubStats, QuoteHub, SubscriptionHandle};
pub use ingest::IngestWorker;
pub use poller::{PollOutcome, SnapshotPoller};
pub use supervisor::{ConnectionSupervisor, SubscriptionIntent};

/// State shared by the hub and the background tasks.
///
/// Lock order: `multiplexer` before the cache's internal lock. Interest
/// changes and evictions update both under the multiplexer lock.
#[derive(Debug)]
pub struct SyncState {
    /// Per-symbol quote store.
    pub cache: QuoteCache,
    /// Reference-counted interest.
    pub multiplexer: Mutex<SubscriptionMultiplexer>,
    /// Symbol class configuration.
    pub classes: SymbolClassMap,
    /// Consumer handles and their callbacks.
    pub registry: HandleRegistry,
}

impl SyncState {
    /// Create empty shared state.
    #[must_use]
    pub fn new(classes: SymbolClassMap, unsubscribe_debounce: Duration) -> Self {
        Self {
            cache: QuoteCache::new(),
            multiplexer: Mutex::new(SubscriptionMultiplexer::new(unsubscribe_debounce)),
            classes,
            registry: HandleRegistry::default(),
        }
    }
}

/// Current monotonic time as a `std` instant, honouring tokio's paused clock.
pub(crate) fn monotonic_now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}
