//! Quote Sync Binary
//!
//! Runs the quote synchronization core against a WebSocket push feed and an
//! HTTP snapshot source, serves health and metrics, and logs updates for
//! the configured watch symbols.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin quote-sync
//! ```
//!
//! # Environment Variables
//!
//! - `QUOTE_SYNC_PUSH_URL`: push feed (default: `ws://127.0.0.1:8765/quotes`)
//! - `QUOTE_SYNC_SNAPSHOT_URL`: snapshot endpoint (default: `http://127.0.0.1:8080/api/quotes`)
//! - `QUOTE_SYNC_WATCH_SYMBOLS`: comma-separated symbols to subscribe at startup
//! - `QUOTE_SYNC_HEALTH_PORT`: health check HTTP port (default: 8083)
//! - `QUOTE_SYNC_*`: timing overrides, see `SyncConfig`
//! - `OTEL_ENABLED`: export spans over OTLP (default: false)
//! - `RUST_LOG`: log filter (default: `quote_sync=info`)

use std::sync::Arc;
use std::time::Duration;

use quote_sync::infrastructure::health::{HealthServer, HealthServerState};
use quote_sync::infrastructure::telemetry;
use quote_sync::{
    HttpSnapshotSource, QuoteHub, QuoteSyncRuntime, SubscriptionHandle, SyncConfig,
    WsPushConnector, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    load_dotenv();

    // Initialize telemetry (tracing + optional OTLP)
    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting quote sync");

    let _metrics_handle = init_metrics()?;

    let config = SyncConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let connector = WsPushConnector::new(config.push.url.clone())
        .with_connect_timeout(config.push.connect_timeout);
    let snapshot = HttpSnapshotSource::new(config.snapshot.url.clone(), config.snapshot.timeout)?;

    let runtime = QuoteSyncRuntime::spawn(
        config.runtime_config(),
        Arc::new(connector),
        Arc::new(snapshot),
        shutdown_token.child_token(),
    );
    let hub = runtime.hub();

    // Spawn health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        hub.clone(),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    let health_task = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    let watch_handle = watch_symbols(&hub, &config)?;

    tracing::info!("Quote sync ready");

    await_shutdown(shutdown_token).await;

    if let Some(handle) = watch_handle {
        hub.unsubscribe(&handle);
    }

    let drained = async {
        runtime.shutdown().await;
        if let Err(e) = health_task.await {
            tracing::warn!(error = %e, "Health server task ended abnormally");
        }
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, drained).await.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Graceful shutdown timed out"
        );
    }

    tracing::info!("Quote sync stopped");
    Ok(())
}

/// Subscribe to the configured watch symbols and log every update.
fn watch_symbols(
    hub: &QuoteHub,
    config: &SyncConfig,
) -> Result<Option<SubscriptionHandle>, quote_sync::ConsumerError> {
    if config.watch_symbols.is_empty() {
        return Ok(None);
    }

    let handle = hub.subscribe(config.watch_symbols.iter().map(quote_sync::Symbol::as_str))?;
    hub.on_update(&handle, |update| {
        for quote in &update.quotes {
            tracing::info!(
                symbol = %quote.symbol,
                price = ?quote.price,
                change_percent = %quote.change_percent,
                live = quote.is_live,
                source = quote.source.map_or("none", |s| s.as_str()),
                "Quote update"
            );
        }
    })?;

    tracing::info!(
        symbols = config.watch_symbols.len(),
        "Watching configured symbols"
    );
    Ok(Some(handle))
}

/// Log the parsed configuration.
fn log_config(config: &SyncConfig) {
    tracing::info!(
        push_url = %config.push.url,
        snapshot_url = %config.snapshot.url,
        health_port = config.server.health_port,
        watch_symbols = config.watch_symbols.len(),
        "Configuration loaded"
    );
    tracing::debug!(
        heartbeat_secs = config.connection.heartbeat_interval.as_secs(),
        max_reconnect_attempts = config.connection.max_reconnect_attempts,
        batch_window_ms = u64::try_from(config.sync.batch_window.as_millis()).unwrap_or(u64::MAX),
        "Timing configuration"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
