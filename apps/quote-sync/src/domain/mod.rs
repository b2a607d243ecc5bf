//! Domain Layer - Core quote synchronization types and rules.
//!
//! Everything here is synchronous and free of I/O. Time is passed in by
//! callers so the rules can be exercised with a fake clock.

/// Per-symbol latest-value store and source arbitration.
pub mod cache;

/// Symbol class configuration (polling cadence, freshness, push availability).
pub mod classes;

/// Push connection state machine, backoff and heartbeat policies.
pub mod connection;

/// Quote records, symbols and consumer views.
pub mod quote;

/// Reference-counted subscription tracking.
pub mod subscription;
