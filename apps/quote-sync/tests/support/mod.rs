//! Scripted push feed and in-memory snapshot source for runtime tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use quote_sync::{
    ClientCommand, ConnectionState, PushConnection, PushConnector, PushEvent, QuoteHub,
    QuoteRecord, QuoteSyncRuntime, RuntimeConfig, SnapshotError, SnapshotRequest, SnapshotSource,
    Symbol,
};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub fn sym(s: &str) -> Symbol {
    Symbol::parse(s).unwrap()
}

// =============================================================================
// Scripted push connector
// =============================================================================

#[derive(Default)]
struct ConnectorState {
    attempts: usize,
    connections: usize,
    refuse_next: usize,
    refuse_all: bool,
    sent: Vec<(usize, ClientCommand)>,
    live: Option<mpsc::UnboundedSender<Result<PushEvent, quote_sync::TransportError>>>,
}

/// Push connector whose behaviour is driven by the test.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Refuse the next `n` handshakes.
    pub fn refuse_next(&self, n: usize) {
        self.state.lock().refuse_next = n;
    }

    /// Refuse every handshake until toggled off.
    pub fn refuse_all(&self, refuse: bool) {
        self.state.lock().refuse_all = refuse;
    }

    pub fn attempts(&self) -> usize {
        self.state.lock().attempts
    }

    pub fn connections(&self) -> usize {
        self.state.lock().connections
    }

    /// Commands sent on the `n`th successful connection (1-based), pings excluded.
    pub fn sent_on(&self, connection: usize) -> Vec<ClientCommand> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|(n, cmd)| *n == connection && *cmd != ClientCommand::Ping)
            .map(|(_, cmd)| cmd.clone())
            .collect()
    }

    /// Every command sent on any connection, pings excluded.
    pub fn sent(&self) -> Vec<ClientCommand> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|(_, cmd)| *cmd != ClientCommand::Ping)
            .map(|(_, cmd)| cmd.clone())
            .collect()
    }

    /// Deliver an event on the live connection.
    pub fn emit(&self, event: PushEvent) {
        let state = self.state.lock();
        let live = state.live.as_ref().expect("no live connection");
        live.send(Ok(event)).expect("connection dropped");
    }

    /// Deliver a push quote stamped `observed_at`.
    pub fn emit_quote(&self, symbol: &str, price: Decimal, observed_at: DateTime<Utc>) {
        self.emit(PushEvent::Quote(QuoteRecord::push(sym(symbol), price, observed_at)));
    }

    /// Close the live connection from the server side.
    pub fn drop_connection(&self) {
        self.state.lock().live = None;
    }
}

#[async_trait]
impl PushConnector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn PushConnection>, quote_sync::TransportError> {
        let mut state = self.state.lock();
        state.attempts += 1;

        if state.refuse_all {
            return Err(quote_sync::TransportError::Connect("refused".to_string()));
        }
        if state.refuse_next > 0 {
            state.refuse_next -= 1;
            return Err(quote_sync::TransportError::Connect("refused".to_string()));
        }

        state.connections += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        state.live = Some(tx);

        Ok(Box::new(ScriptedConnection {
            number: state.connections,
            events: rx,
            state: Arc::clone(&self.state),
        }))
    }
}

struct ScriptedConnection {
    number: usize,
    events: mpsc::UnboundedReceiver<Result<PushEvent, quote_sync::TransportError>>,
    state: Arc<Mutex<ConnectorState>>,
}

#[async_trait]
impl PushConnection for ScriptedConnection {
    async fn send(&mut self, command: ClientCommand) -> Result<(), quote_sync::TransportError> {
        self.state.lock().sent.push((self.number, command));
        Ok(())
    }

    async fn next_event(&mut self) -> Option<Result<PushEvent, quote_sync::TransportError>> {
        self.events.recv().await
    }

    async fn close(&mut self) {}
}

// =============================================================================
// In-memory snapshot source
// =============================================================================

/// Snapshot source serving fixed prices.
#[derive(Default)]
pub struct StaticSnapshotSource {
    prices: Mutex<HashMap<Symbol, (Decimal, DateTime<Utc>)>>,
    failing: AtomicBool,
    calls: AtomicUsize,
    requests: Mutex<VecDeque<SnapshotRequest>>,
}

impl StaticSnapshotSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_price(&self, symbol: &str, price: Decimal, observed_at: DateTime<Utc>) {
        self.prices.lock().insert(sym(symbol), (price, observed_at));
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SnapshotRequest> {
        self.requests.lock().iter().cloned().collect()
    }
}

#[async_trait]
impl SnapshotSource for StaticSnapshotSource {
    async fn fetch(&self, request: &SnapshotRequest) -> Result<Vec<QuoteRecord>, SnapshotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push_back(request.clone());

        if self.failing.load(Ordering::SeqCst) {
            return Err(SnapshotError::Status { status: 503 });
        }

        let prices = self.prices.lock();
        Ok(request
            .symbols
            .iter()
            .filter_map(|symbol| {
                prices
                    .get(symbol)
                    .map(|(price, at)| QuoteRecord::snapshot(symbol.clone(), *price, *at))
            })
            .collect())
    }
}

// =============================================================================
// Runtime harness
// =============================================================================

pub struct Harness {
    pub runtime: QuoteSyncRuntime,
    pub hub: QuoteHub,
    pub connector: Arc<ScriptedConnector>,
    pub snapshot: Arc<StaticSnapshotSource>,
}

/// Runtime tunables with a long heartbeat so idle tests never time out.
pub fn test_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.heartbeat.interval = Duration::from_secs(3_600);
    config
}

pub fn start(config: RuntimeConfig) -> Harness {
    let connector = ScriptedConnector::new();
    let snapshot = StaticSnapshotSource::new();
    let runtime = QuoteSyncRuntime::spawn(
        config,
        connector.clone(),
        snapshot.clone(),
        CancellationToken::new(),
    );
    let hub = runtime.hub();

    Harness {
        runtime,
        hub,
        connector,
        snapshot,
    }
}

/// Wait (in virtual time) until the published state matches.
pub async fn wait_for_state(hub: &QuoteHub, wanted: ConnectionState) {
    let mut rx = hub.watch_connection_state();
    tokio::time::timeout(Duration::from_secs(600), rx.wait_for(|s| *s == wanted))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {wanted}"))
        .expect("state channel closed");
}

/// Poll `condition` every 10ms of virtual time, up to a minute.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..6_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within a minute");
}
