//! Infrastructure Layer - Adapters for external systems.
//!
//! This layer implements the port interfaces defined in the application layer
//! and wires the service to its environment.

/// Environment configuration.
pub mod config;

/// Health check and metrics HTTP endpoint.
pub mod health;

/// Prometheus metrics.
pub mod metrics;

/// WebSocket push feed adapter.
pub mod push;

/// HTTP snapshot source adapter.
pub mod snapshot;

/// Logging and OpenTelemetry tracing.
pub mod telemetry;
