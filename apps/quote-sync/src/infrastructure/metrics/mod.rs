//! Prometheus Metrics Module
//!
//! Exposes quote sync metrics in the Prometheus text format.
//!
//! # Metrics Categories
//!
//! - **Observations**: received, accepted and rejected by source or reason
//! - **Delivery**: consumer callbacks invoked
//! - **Connection**: push state, reconnects, transport errors, bad frames
//! - **Snapshot**: fetch failures, latency and degraded flags per class
//! - **Registry**: tracked symbols and live handles
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::cache::RejectReason;
use crate::domain::connection::ConnectionState;
use crate::domain::quote::QuoteSource;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder, or return the handle installed earlier.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Observation counters
    describe_counter!(
        "quote_sync_observations_received_total",
        "Observations received from the push and snapshot sources"
    );
    describe_counter!(
        "quote_sync_observations_accepted_total",
        "Observations applied to the quote cache"
    );
    describe_counter!(
        "quote_sync_observations_rejected_total",
        "Observations rejected by arbitration, by reason"
    );

    // Delivery
    describe_counter!(
        "quote_sync_callbacks_delivered_total",
        "Coalesced consumer callbacks invoked"
    );

    // Connection
    describe_gauge!(
        "quote_sync_connection_state",
        "Push connection state (0 disconnected .. 5 shut down)"
    );
    describe_counter!(
        "quote_sync_reconnects_total",
        "Push reconnection attempts"
    );
    describe_counter!(
        "quote_sync_transport_errors_total",
        "Push transport errors by stage"
    );
    describe_counter!(
        "quote_sync_malformed_frames_total",
        "Push frame elements that failed to decode"
    );

    // Snapshot
    describe_counter!(
        "quote_sync_snapshot_failures_total",
        "Failed snapshot fetches by class"
    );
    describe_gauge!(
        "quote_sync_snapshot_degraded",
        "1 when a class has hit the consecutive snapshot failure threshold"
    );
    describe_histogram!(
        "quote_sync_snapshot_fetch_seconds",
        "Snapshot fetch latency by class"
    );

    // Registry
    describe_gauge!(
        "quote_sync_tracked_symbols",
        "Symbols currently tracked by the quote cache"
    );
    describe_gauge!("quote_sync_handles", "Live consumer subscription handles");
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record an observation handed to the ingest worker.
pub fn record_observation_received(source: QuoteSource) {
    counter!("quote_sync_observations_received_total", "source" => source.as_str()).increment(1);
}

/// Record an observation accepted (or enriched) by the cache.
pub fn record_observation_accepted(source: QuoteSource) {
    counter!("quote_sync_observations_accepted_total", "source" => source.as_str()).increment(1);
}

/// Record an observation rejected by arbitration.
pub fn record_observation_rejected(reason: RejectReason) {
    counter!("quote_sync_observations_rejected_total", "reason" => reason.as_str()).increment(1);
}

/// Record callbacks invoked during one flush.
pub fn record_callbacks_delivered(count: usize) {
    counter!("quote_sync_callbacks_delivered_total").increment(u64::try_from(count).unwrap_or(u64::MAX));
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("quote_sync_reconnects_total").increment(1);
}

/// Record a push transport error. `stage` is `connect` or `session`.
pub fn record_transport_error(stage: &str) {
    counter!("quote_sync_transport_errors_total", "stage" => stage.to_string()).increment(1);
}

/// Record a push frame element that failed to decode.
pub fn record_malformed_frame() {
    counter!("quote_sync_malformed_frames_total").increment(1);
}

/// Record a failed snapshot fetch for a class.
pub fn record_snapshot_failure(class: &str) {
    counter!("quote_sync_snapshot_failures_total", "class" => class.to_string()).increment(1);
}

/// Record snapshot fetch latency for a class.
pub fn record_snapshot_fetch_duration(class: &str, duration: Duration) {
    histogram!("quote_sync_snapshot_fetch_seconds", "class" => class.to_string())
        .record(duration.as_secs_f64());
}

/// Set the snapshot degraded flag for a class.
pub fn set_snapshot_degraded(class: &str, degraded: bool) {
    gauge!("quote_sync_snapshot_degraded", "class" => class.to_string())
        .set(if degraded { 1.0 } else { 0.0 });
}

/// Set the published push connection state.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("quote_sync_connection_state").set(state.as_gauge());
}

/// Set the number of tracked symbols.
#[allow(clippy::cast_precision_loss)]
pub fn set_tracked_symbols(count: usize) {
    gauge!("quote_sync_tracked_symbols").set(count as f64);
}

/// Set the number of live handles.
#[allow(clippy::cast_precision_loss)]
pub fn set_handles(count: usize) {
    gauge!("quote_sync_handles").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_never_panics() {
        record_observation_received(QuoteSource::Push);
        record_observation_rejected(RejectReason::Stale);
        set_connection_state(ConnectionState::Connected);
        set_snapshot_degraded("crypto", true);
    }

    #[test]
    fn init_is_idempotent_and_renders_metrics() {
        let handle = init_metrics().unwrap();
        let again = init_metrics().unwrap();
        assert!(get_metrics_handle().is_some());

        record_observation_accepted(QuoteSource::Snapshot);
        record_transport_error("connect");
        set_tracked_symbols(7);

        let rendered = again.render();
        assert!(rendered.contains("quote_sync_observations_accepted_total"));
        assert!(rendered.contains("stage=\"connect\""));
        assert!(rendered.contains("quote_sync_tracked_symbols"));
        drop(handle);
    }
}
