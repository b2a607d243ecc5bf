//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for external systems (push feed, snapshot source).
pub mod ports;

/// Task wiring for a running quote sync core.
pub mod runtime;

/// Consumer API, ingest worker, supervisor and poller.
pub mod services;
