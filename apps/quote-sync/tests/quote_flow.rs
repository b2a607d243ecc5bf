//! End-to-end observation flow through the running core.

mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use quote_sync::{ConnectionState, PushEvent, QuoteSource, QuoteUpdate};
use rust_decimal_macros::dec;
use support::{eventually, start, test_config, wait_for_state};

fn recorder() -> (Arc<Mutex<Vec<QuoteUpdate>>>, impl Fn(&QuoteUpdate) + Send + Sync + 'static) {
    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&updates);
    (updates, move |update: &QuoteUpdate| sink.lock().push(update.clone()))
}

#[tokio::test(start_paused = true)]
async fn older_snapshot_never_overwrites_newer_push() {
    let h = start(test_config());
    let handle = h.hub.subscribe(["BTCUSDT"]).unwrap();
    let (updates, callback) = recorder();
    h.hub.on_update(&handle, callback).unwrap();

    wait_for_state(&h.hub, ConnectionState::Connected).await;

    let t1 = Utc::now();
    h.connector.emit_quote("BTCUSDT", dec!(50000), t1);
    eventually(|| h.hub.get_quote("BTCUSDT").and_then(|q| q.price) == Some(dec!(50000))).await;

    // The poller picks this up on its next crypto tick.
    h.snapshot
        .set_price("BTCUSDT", dec!(49990), t1 - chrono::Duration::seconds(2));
    let calls = h.snapshot.calls();
    eventually(|| h.snapshot.calls() > calls).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let view = h.hub.get_quote("BTCUSDT").unwrap();
    assert_eq!(view.price, Some(dec!(50000)));
    assert_eq!(view.source, Some(QuoteSource::Push));
    assert!(view.is_live);
    assert_eq!(view.stale_since_ms, None);

    let prices: Vec<_> = updates
        .lock()
        .iter()
        .flat_map(|u| u.quotes.iter().map(|q| q.price))
        .collect();
    assert_eq!(prices, vec![Some(dec!(50000))]);

    h.runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn snapshot_only_symbols_are_served_by_polling() {
    let h = start(test_config());
    h.snapshot.set_price("^GSPC", dec!(5100.25), Utc::now());

    let handle = h.hub.subscribe(["^GSPC"]).unwrap();
    let (updates, callback) = recorder();
    h.hub.on_update(&handle, callback).unwrap();

    eventually(|| !updates.lock().is_empty()).await;

    let view = h.hub.get_quote("^GSPC").unwrap();
    assert_eq!(view.price, Some(dec!(5100.25)));
    assert_eq!(view.source, Some(QuoteSource::Snapshot));
    assert!(!view.is_live);

    // The index class has no push feed, so nothing was connected.
    assert_eq!(h.connector.attempts(), 0);
    assert_eq!(h.hub.connection_state(), ConnectionState::Disconnected);
    assert!(
        h.snapshot
            .requests()
            .iter()
            .all(|req| req.symbols.iter().all(|s| s.as_str() == "^GSPC"))
    );

    h.runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn bursts_are_coalesced_per_batching_tick() {
    let h = start(test_config());
    let handle = h.hub.subscribe(["AAPL", "MSFT"]).unwrap();
    let (updates, callback) = recorder();
    h.hub.on_update(&handle, callback).unwrap();

    wait_for_state(&h.hub, ConnectionState::Connected).await;

    let base = Utc::now();
    for i in 1..=20_i64 {
        h.connector.emit_quote(
            "AAPL",
            rust_decimal::Decimal::from(100 + i),
            base + chrono::Duration::milliseconds(i),
        );
    }
    h.connector.emit_quote("MSFT", dec!(410), base);

    eventually(|| !updates.lock().is_empty()).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let updates = updates.lock();
    assert_eq!(updates.len(), 1, "one callback for the whole burst");
    let aapl = updates[0]
        .quotes
        .iter()
        .find(|q| q.symbol.as_str() == "AAPL")
        .unwrap();
    assert_eq!(aapl.price, Some(dec!(120)));
    assert_eq!(updates[0].quotes.len(), 2);
    drop(updates);

    h.runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_do_not_disturb_the_session() {
    let h = start(test_config());
    h.hub.subscribe(["AAPL"]).unwrap();
    wait_for_state(&h.hub, ConnectionState::Connected).await;

    h.connector
        .emit(PushEvent::Malformed("price: invalid type".to_string()));
    h.connector.emit(PushEvent::Heartbeat);
    h.connector.emit_quote("AAPL", dec!(187.5), Utc::now());

    eventually(|| h.hub.get_quote("AAPL").and_then(|q| q.price) == Some(dec!(187.5))).await;
    assert_eq!(h.hub.connection_state(), ConnectionState::Connected);
    assert_eq!(h.connector.connections(), 1);

    h.runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn change_metrics_use_the_session_baseline() {
    let h = start(test_config());
    h.hub.subscribe(["AAPL"]).unwrap();
    wait_for_state(&h.hub, ConnectionState::Connected).await;

    let t0 = Utc::now();
    h.connector.emit_quote("AAPL", dec!(200), t0);
    h.connector
        .emit_quote("AAPL", dec!(210), t0 + chrono::Duration::seconds(1));
    eventually(|| h.hub.get_quote("AAPL").and_then(|q| q.price) == Some(dec!(210))).await;

    let view = h.hub.get_quote("AAPL").unwrap();
    assert_eq!(view.change_amount, dec!(10));
    assert_eq!(view.change_percent, dec!(5));

    h.hub.reset_session();
    h.connector
        .emit_quote("AAPL", dec!(220), t0 + chrono::Duration::seconds(2));
    eventually(|| h.hub.get_quote("AAPL").and_then(|q| q.price) == Some(dec!(220))).await;

    let view = h.hub.get_quote("AAPL").unwrap();
    assert_eq!(view.change_amount, dec!(0));

    h.runtime.shutdown().await;
}
