#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Quote Sync - Real-time Quote Synchronization Core
//!
//! Keeps one consistent current price per symbol for many in-process
//! consumers, fed by a shared push connection and a polled snapshot source.
//!
//! # Layers (inside to outside)
//!
//! - **Domain**: Pure state and rules
//!   - `quote`: symbols, observations and consumer views
//!   - `cache`: per-symbol state with push/snapshot arbitration
//!   - `subscription`: reference-counted interest with debounced release
//!   - `classes`: polling cadence and freshness per symbol class
//!   - `connection`: push lifecycle state machine, backoff and heartbeat
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: push feed and snapshot source interfaces
//!   - `services`: consumer hub, ingest worker, supervisor, poller
//!   - `runtime`: task wiring
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `push`: WebSocket feed client
//!   - `snapshot`: HTTP snapshot client
//!   - `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! Push WS ──► Supervisor ──┐
//!                          ├──► Ingest Worker ──► Quote Cache ──► QuoteHub ──► Consumers
//! Snapshot HTTP ► Poller ──┘          │
//!                                     └──► coalesced callbacks (one per handle per tick)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core quote state with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::cache::{IngestOutcome, QuoteCache, RejectReason};
pub use domain::classes::{MatchRule, SymbolClass, SymbolClassMap};
pub use domain::connection::ConnectionState;
pub use domain::quote::{QuoteRecord, QuoteSource, QuoteView, Symbol, SymbolError};

// Consumer API
pub use application::runtime::{QuoteSyncRuntime, RuntimeConfig};
pub use application::services::{
    ConsumerError, HubStats, QuoteHub, QuoteUpdate, SubscriptionHandle,
};

// Ports (for custom adapters and tests)
pub use application::ports::{
    ClientCommand, PushConnection, PushConnector, PushEvent, SnapshotError, SnapshotRequest,
    SnapshotSource, TransportError,
};

// Adapters
pub use infrastructure::push::WsPushConnector;
pub use infrastructure::snapshot::HttpSnapshotSource;

// Infrastructure config
pub use infrastructure::config::{ConfigError, SyncConfig};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
