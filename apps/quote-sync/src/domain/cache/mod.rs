//! Quote Cache
//!
//! Per-symbol latest-value store with source arbitration.
//!
//! # Arbitration
//!
//! For a tracked symbol, an incoming [`QuoteRecord`] is checked in order:
//!
//! 1. An `observed_at` older than the latest accepted record is stale.
//! 2. A snapshot arriving while a push observation is still fresh is
//!    advisory: it may fill a missing `volume`, never the price.
//! 3. Equal timestamps: push beats snapshot, same-source repeats are
//!    duplicates.
//! 4. Anything else is accepted.
//!
//! The first accepted price per symbol becomes the session baseline. It is
//! kept across eviction and only cleared by [`QuoteCache::reset_session`].
//!
//! # Consistency
//!
//! Each [`SymbolState`] is immutable once published. Writers build a new
//! state and swap the `Arc`, so readers holding the read lock for a clone
//! never observe a partially applied observation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;

use super::quote::{QuoteRecord, QuoteSource, QuoteView, Symbol};

// =============================================================================
// Outcomes
// =============================================================================

/// Why an observation was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The symbol is not currently tracked.
    Untracked,
    /// `observed_at` is older than the latest accepted record.
    Stale,
    /// Same source and same `observed_at` as the latest accepted record.
    Duplicate,
    /// Push data is authoritative and the snapshot had nothing to add.
    PushAuthoritative,
}

impl RejectReason {
    /// Metric label for this reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Untracked => "untracked",
            Self::Stale => "stale",
            Self::Duplicate => "duplicate",
            Self::PushAuthoritative => "push_authoritative",
        }
    }
}

/// Result of [`QuoteCache::ingest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The observation replaced the latest record.
    Accepted,
    /// An advisory snapshot filled a field the latest record lacked.
    Enriched,
    /// The observation was dropped.
    Rejected(RejectReason),
}

impl IngestOutcome {
    /// Whether the symbol's view changed.
    #[must_use]
    pub const fn changed(self) -> bool {
        matches!(self, Self::Accepted | Self::Enriched)
    }
}

// =============================================================================
// Symbol State
// =============================================================================

/// Cached state for one symbol.
#[derive(Debug, Clone)]
pub struct SymbolState {
    latest: Option<QuoteRecord>,
    last_push_at: Option<DateTime<Utc>>,
    freshness_window: Duration,
    tracked: bool,
}

impl SymbolState {
    const fn new(freshness_window: Duration) -> Self {
        Self {
            latest: None,
            last_push_at: None,
            freshness_window,
            tracked: true,
        }
    }

    /// Latest accepted record.
    #[must_use]
    pub const fn latest(&self) -> Option<&QuoteRecord> {
        self.latest.as_ref()
    }

    /// Arrival time of the latest accepted push record.
    #[must_use]
    pub const fn last_push_at(&self) -> Option<DateTime<Utc>> {
        self.last_push_at
    }

    fn push_is_fresh(&self, at: DateTime<Utc>) -> bool {
        self.last_push_at
            .is_some_and(|pushed| within_window(pushed, at, self.freshness_window))
    }
}

fn within_window(from: DateTime<Utc>, to: DateTime<Utc>, window: Duration) -> bool {
    let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
    to.signed_duration_since(from) < window
}

// =============================================================================
// Quote Cache
// =============================================================================

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<Symbol, Arc<SymbolState>>,
    baselines: HashMap<Symbol, Decimal>,
}

/// Thread-safe per-symbol quote store.
///
/// `ingest` is expected to be called from a single writer; reads may come
/// from any thread.
#[derive(Debug, Default)]
pub struct QuoteCache {
    inner: RwLock<CacheInner>,
}

impl QuoteCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a symbol.
    ///
    /// A previously evicted symbol keeps its last record, so ordering and
    /// the cached view survive a quick unsubscribe/resubscribe.
    ///
    /// Returns `true` if the symbol was not tracked before.
    pub fn track(&self, symbol: &Symbol, freshness_window: Duration) -> bool {
        let mut inner = self.inner.write();

        let revived = match inner.entries.get(symbol) {
            Some(state) if state.tracked => return false,
            Some(state) => {
                let mut revived = SymbolState::clone(state);
                revived.tracked = true;
                revived.freshness_window = freshness_window;
                revived
            }
            None => SymbolState::new(freshness_window),
        };

        inner.entries.insert(symbol.clone(), Arc::new(revived));
        true
    }

    /// Stop tracking a symbol. Further observations are rejected as untracked.
    ///
    /// The entry stays readable, with or without an observation.
    ///
    /// Returns `true` if the symbol was tracked.
    pub fn evict(&self, symbol: &Symbol) -> bool {
        let mut inner = self.inner.write();

        let retired = match inner.entries.get(symbol) {
            Some(state) if state.tracked => {
                let mut retired = SymbolState::clone(state);
                retired.tracked = false;
                retired
            }
            _ => return false,
        };

        inner.entries.insert(symbol.clone(), Arc::new(retired));
        true
    }

    /// Apply an observation.
    pub fn ingest(&self, record: QuoteRecord) -> IngestOutcome {
        let mut inner = self.inner.write();
        let CacheInner { entries, baselines } = &mut *inner;

        let Some(slot) = entries.get_mut(record.symbol()) else {
            return IngestOutcome::Rejected(RejectReason::Untracked);
        };
        if !slot.tracked {
            return IngestOutcome::Rejected(RejectReason::Untracked);
        }

        let (next, outcome) = match arbitrate(slot.as_ref(), record) {
            Verdict::Accept(next) => (next, IngestOutcome::Accepted),
            Verdict::Enrich(next) => (next, IngestOutcome::Enriched),
            Verdict::Reject(reason) => return IngestOutcome::Rejected(reason),
        };

        if outcome == IngestOutcome::Accepted {
            if let Some(latest) = next.latest.as_ref() {
                baselines
                    .entry(latest.symbol().clone())
                    .or_insert_with(|| latest.price());
            }
        }

        *slot = Arc::new(next);
        outcome
    }

    /// Read the current view of a symbol.
    ///
    /// Returns `None` if the symbol has never been tracked.
    #[must_use]
    pub fn read(&self, symbol: &str) -> Option<QuoteView> {
        self.read_at(symbol, Utc::now())
    }

    /// Read the view of a symbol as of `now`.
    #[must_use]
    pub fn read_at(&self, symbol: &str, now: DateTime<Utc>) -> Option<QuoteView> {
        let (state, baseline, key) = {
            let inner = self.inner.read();
            let (key, state) = inner.entries.get_key_value(symbol)?;
            (
                Arc::clone(state),
                inner.baselines.get(symbol).copied(),
                key.clone(),
            )
        };

        Some(build_view(key, &state, baseline, now))
    }

    /// Snapshot of a symbol's state.
    #[must_use]
    pub fn state(&self, symbol: &str) -> Option<Arc<SymbolState>> {
        self.inner.read().entries.get(symbol).cloned()
    }

    /// Session baseline for a symbol.
    #[must_use]
    pub fn baseline(&self, symbol: &str) -> Option<Decimal> {
        self.inner.read().baselines.get(symbol).copied()
    }

    /// Clear every baseline. The next accepted observation of each symbol
    /// sets a new one.
    pub fn reset_session(&self) {
        self.inner.write().baselines.clear();
    }

    /// Number of symbols currently tracked.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.inner
            .read()
            .entries
            .values()
            .filter(|state| state.tracked)
            .count()
    }
}

enum Verdict {
    Accept(SymbolState),
    Enrich(SymbolState),
    Reject(RejectReason),
}

fn arbitrate(current: &SymbolState, record: QuoteRecord) -> Verdict {
    let Some(latest) = current.latest.as_ref() else {
        return Verdict::Accept(accept(current, record));
    };

    if record.observed_at() < latest.observed_at() {
        return Verdict::Reject(RejectReason::Stale);
    }

    if record.source() == QuoteSource::Snapshot && current.push_is_fresh(record.received_at()) {
        return match (latest.volume(), record.volume()) {
            (None, Some(volume)) => {
                let mut next = current.clone();
                next.latest = Some(latest.clone().with_volume(Some(volume)));
                Verdict::Enrich(next)
            }
            _ => Verdict::Reject(RejectReason::PushAuthoritative),
        };
    }

    if record.observed_at() == latest.observed_at() {
        return match (latest.source(), record.source()) {
            (a, b) if a == b => Verdict::Reject(RejectReason::Duplicate),
            (QuoteSource::Push, QuoteSource::Snapshot) => {
                Verdict::Reject(RejectReason::PushAuthoritative)
            }
            _ => Verdict::Accept(accept(current, record)),
        };
    }

    Verdict::Accept(accept(current, record))
}

fn accept(current: &SymbolState, record: QuoteRecord) -> SymbolState {
    let carried_volume = current.latest.as_ref().and_then(QuoteRecord::volume);
    let record = match record.volume() {
        Some(_) => record,
        None => record.with_volume(carried_volume),
    };

    let last_push_at = match record.source() {
        QuoteSource::Push => Some(record.received_at()),
        QuoteSource::Snapshot => current.last_push_at,
    };

    SymbolState {
        latest: Some(record),
        last_push_at,
        freshness_window: current.freshness_window,
        tracked: current.tracked,
    }
}

fn build_view(
    symbol: Symbol,
    state: &SymbolState,
    baseline: Option<Decimal>,
    now: DateTime<Utc>,
) -> QuoteView {
    let latest = state.latest.as_ref();
    let price = latest.map(QuoteRecord::price);
    let (change_amount, change_percent) = derive_change(price, baseline);

    let is_live = state
        .last_push_at
        .is_some_and(|pushed| within_window(pushed, now, state.freshness_window));
    let stale_since_ms = if is_live {
        None
    } else {
        latest.map(|record| {
            now.signed_duration_since(record.received_at())
                .num_milliseconds()
                .max(0)
        })
    };

    QuoteView {
        symbol,
        price,
        volume: latest.and_then(QuoteRecord::volume),
        change_amount,
        change_percent,
        is_live,
        stale_since_ms,
        source: latest.map(QuoteRecord::source),
        observed_at: latest.map(QuoteRecord::observed_at),
    }
}

/// Compute `(change_amount, change_percent)` against a baseline.
///
/// A missing price, missing baseline, or zero baseline yields zeros.
#[must_use]
pub fn derive_change(price: Option<Decimal>, baseline: Option<Decimal>) -> (Decimal, Decimal) {
    let (Some(price), Some(baseline)) = (price, baseline) else {
        return (Decimal::ZERO, Decimal::ZERO);
    };

    let amount = price - baseline;
    let percent = amount
        .checked_div(baseline)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO);

    (amount, percent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    const WINDOW: Duration = Duration::from_secs(15);

    fn sym(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T14:30:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn at_ms(offset: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::milliseconds(offset)
    }

    fn push(symbol: &str, price: Decimal, observed_ms: i64) -> QuoteRecord {
        QuoteRecord::push(sym(symbol), price, at_ms(observed_ms)).with_received_at(at_ms(observed_ms))
    }

    fn snapshot(symbol: &str, price: Decimal, observed_ms: i64, received_ms: i64) -> QuoteRecord {
        QuoteRecord::snapshot(sym(symbol), price, at_ms(observed_ms))
            .with_received_at(at_ms(received_ms))
    }

    fn tracked(symbol: &str) -> QuoteCache {
        let cache = QuoteCache::new();
        cache.track(&sym(symbol), WINDOW);
        cache
    }

    #[test]
    fn untracked_symbol_is_rejected() {
        let cache = QuoteCache::new();
        let outcome = cache.ingest(push("AAPL", dec!(150), 0));

        assert_eq!(outcome, IngestOutcome::Rejected(RejectReason::Untracked));
        assert!(cache.read("AAPL").is_none());
    }

    #[test]
    fn tracked_symbol_without_data_has_empty_view() {
        let cache = tracked("AAPL");
        let view = cache.read_at("AAPL", t0()).unwrap();

        assert_eq!(view.price, None);
        assert!(!view.is_live);
        assert_eq!(view.stale_since_ms, None);
        assert_eq!(view.change_percent, Decimal::ZERO);
    }

    #[test]
    fn btcusdt_scenario() {
        let cache = tracked("BTCUSDT");

        let first = cache.ingest(snapshot("BTCUSDT", dec!(50000), 0, 0));
        assert_eq!(first, IngestOutcome::Accepted);
        let view = cache.read_at("BTCUSDT", at_ms(0)).unwrap();
        assert_eq!(view.price, Some(dec!(50000)));
        assert_eq!(view.change_percent, Decimal::ZERO);

        assert_eq!(
            cache.ingest(push("BTCUSDT", dec!(51000), 1_000)),
            IngestOutcome::Accepted
        );
        let view = cache.read_at("BTCUSDT", at_ms(1_000)).unwrap();
        assert_eq!(view.price, Some(dec!(51000)));
        assert_eq!(view.change_amount, dec!(1000));
        assert_eq!(view.change_percent, dec!(2.0));
        assert!(view.is_live);

        assert_eq!(
            cache.ingest(push("BTCUSDT", dec!(50500), 500)),
            IngestOutcome::Rejected(RejectReason::Stale)
        );
        let view = cache.read_at("BTCUSDT", at_ms(1_000)).unwrap();
        assert_eq!(view.price, Some(dec!(51000)));
    }

    #[test]
    fn push_wins_when_snapshot_arrives_after() {
        let cache = tracked("AAPL");

        cache.ingest(push("AAPL", dec!(101), 10_000));
        let outcome = cache.ingest(snapshot("AAPL", dec!(99), 9_000, 10_100));

        assert_eq!(outcome, IngestOutcome::Rejected(RejectReason::Stale));
        assert_eq!(cache.read("AAPL").unwrap().price, Some(dec!(101)));
    }

    #[test]
    fn push_wins_when_snapshot_arrives_first() {
        let cache = tracked("AAPL");

        assert_eq!(
            cache.ingest(snapshot("AAPL", dec!(99), 9_000, 9_000)),
            IngestOutcome::Accepted
        );
        assert_eq!(
            cache.ingest(push("AAPL", dec!(101), 10_000)),
            IngestOutcome::Accepted
        );

        assert_eq!(cache.read("AAPL").unwrap().price, Some(dec!(101)));
    }

    #[test]
    fn push_beats_snapshot_at_equal_timestamp() {
        let cache = tracked("MSFT");
        cache.ingest(snapshot("MSFT", dec!(300), 5_000, 5_000));

        assert_eq!(
            cache.ingest(push("MSFT", dec!(301), 5_000)),
            IngestOutcome::Accepted
        );
        assert_eq!(cache.read("MSFT").unwrap().price, Some(dec!(301)));
    }

    #[test]
    fn snapshot_loses_tie_against_old_push() {
        let cache = tracked("MSFT");
        cache.ingest(push("MSFT", dec!(301), 5_000));

        // Received long after the push went stale, same observed_at.
        let outcome = cache.ingest(snapshot("MSFT", dec!(300), 5_000, 60_000));

        assert_eq!(outcome, IngestOutcome::Rejected(RejectReason::PushAuthoritative));
        assert_eq!(cache.read("MSFT").unwrap().price, Some(dec!(301)));
    }

    #[test]
    fn same_source_same_timestamp_is_duplicate() {
        let cache = tracked("MSFT");
        cache.ingest(push("MSFT", dec!(301), 5_000));

        assert_eq!(
            cache.ingest(push("MSFT", dec!(302), 5_000)),
            IngestOutcome::Rejected(RejectReason::Duplicate)
        );
    }

    #[test]
    fn fresh_push_makes_newer_snapshot_advisory() {
        let cache = tracked("AAPL");
        cache.ingest(push("AAPL", dec!(150), 0));

        let advisory = snapshot("AAPL", dec!(149), 2_000, 2_000).with_volume(Some(dec!(12345)));
        assert_eq!(cache.ingest(advisory), IngestOutcome::Enriched);

        let view = cache.read_at("AAPL", at_ms(2_000)).unwrap();
        assert_eq!(view.price, Some(dec!(150)));
        assert_eq!(view.volume, Some(dec!(12345)));
        assert_eq!(view.source, Some(QuoteSource::Push));

        let again = snapshot("AAPL", dec!(148), 3_000, 3_000).with_volume(Some(dec!(1)));
        assert_eq!(
            cache.ingest(again),
            IngestOutcome::Rejected(RejectReason::PushAuthoritative)
        );
        assert_eq!(cache.read("AAPL").unwrap().volume, Some(dec!(12345)));
    }

    #[test]
    fn snapshot_accepted_once_push_goes_stale() {
        let cache = tracked("AAPL");
        cache.ingest(push("AAPL", dec!(150), 0));

        let late = snapshot("AAPL", dec!(152), 20_000, 20_000);
        assert_eq!(cache.ingest(late), IngestOutcome::Accepted);

        let view = cache.read_at("AAPL", at_ms(20_000)).unwrap();
        assert_eq!(view.price, Some(dec!(152)));
        assert_eq!(view.source, Some(QuoteSource::Snapshot));
        assert!(!view.is_live);
        assert_eq!(view.stale_since_ms, Some(0));
    }

    #[test]
    fn accepted_record_without_volume_keeps_known_volume() {
        let cache = tracked("AAPL");
        cache.ingest(push("AAPL", dec!(150), 0).with_volume(Some(dec!(10))));
        cache.ingest(push("AAPL", dec!(151), 1_000));

        assert_eq!(cache.read("AAPL").unwrap().volume, Some(dec!(10)));
    }

    #[test]
    fn liveness_expires_after_window() {
        let cache = tracked("AAPL");
        cache.ingest(push("AAPL", dec!(150), 0));

        assert!(cache.read_at("AAPL", at_ms(14_999)).unwrap().is_live);

        let stale = cache.read_at("AAPL", at_ms(15_000)).unwrap();
        assert!(!stale.is_live);
        assert_eq!(stale.stale_since_ms, Some(15_000));
    }

    #[test]
    fn baseline_survives_evict_and_retrack() {
        let cache = tracked("AAPL");
        cache.ingest(push("AAPL", dec!(100), 0));
        cache.ingest(push("AAPL", dec!(110), 1_000));

        assert!(cache.evict(&sym("AAPL")));
        assert_eq!(
            cache.ingest(push("AAPL", dec!(120), 2_000)),
            IngestOutcome::Rejected(RejectReason::Untracked)
        );

        assert!(cache.track(&sym("AAPL"), WINDOW));
        cache.ingest(push("AAPL", dec!(120), 3_000));

        assert_eq!(cache.baseline("AAPL"), Some(dec!(100)));
        let view = cache.read("AAPL").unwrap();
        assert_eq!(view.change_amount, dec!(20));
        assert_eq!(view.change_percent, dec!(20));
    }

    #[test]
    fn evicted_symbol_remains_readable() {
        let cache = tracked("AAPL");
        cache.ingest(push("AAPL", dec!(100), 0));
        cache.evict(&sym("AAPL"));

        assert_eq!(cache.tracked_count(), 0);
        assert_eq!(cache.read("AAPL").unwrap().price, Some(dec!(100)));
    }

    #[test]
    fn evicted_symbol_without_observation_remains_readable() {
        let cache = tracked("AAPL");
        assert!(cache.evict(&sym("AAPL")));

        assert_eq!(cache.tracked_count(), 0);
        let view = cache.read("AAPL").unwrap();
        assert_eq!(view.price, None);
        assert_eq!(view.stale_since_ms, None);
        assert!(!cache.evict(&sym("AAPL")));
    }

    #[test]
    fn retracked_symbol_still_rejects_older_observations() {
        let cache = tracked("AAPL");
        cache.ingest(push("AAPL", dec!(100), 5_000));
        cache.evict(&sym("AAPL"));
        cache.track(&sym("AAPL"), WINDOW);

        assert_eq!(
            cache.ingest(push("AAPL", dec!(90), 1_000)),
            IngestOutcome::Rejected(RejectReason::Stale)
        );
    }

    #[test]
    fn reset_session_rebases_on_next_accept() {
        let cache = tracked("AAPL");
        cache.ingest(push("AAPL", dec!(100), 0));
        cache.reset_session();

        assert_eq!(cache.baseline("AAPL"), None);
        cache.ingest(push("AAPL", dec!(125), 1_000));

        assert_eq!(cache.baseline("AAPL"), Some(dec!(125)));
        assert_eq!(cache.read("AAPL").unwrap().change_amount, Decimal::ZERO);
    }

    #[test]
    fn track_is_idempotent() {
        let cache = QuoteCache::new();
        assert!(cache.track(&sym("AAPL"), WINDOW));
        assert!(!cache.track(&sym("AAPL"), WINDOW));
        assert_eq!(cache.tracked_count(), 1);
    }

    #[test_case(Some(dec!(51000)), Some(dec!(50000)), dec!(1000), dec!(2) ; "two percent up")]
    #[test_case(Some(dec!(45)), Some(dec!(50)), dec!(-5), dec!(-10) ; "ten percent down")]
    #[test_case(Some(dec!(10)), Some(Decimal::ZERO), dec!(10), Decimal::ZERO ; "zero baseline")]
    #[test_case(Some(dec!(10)), None, Decimal::ZERO, Decimal::ZERO ; "no baseline")]
    #[test_case(None, Some(dec!(10)), Decimal::ZERO, Decimal::ZERO ; "no price")]
    fn change_metrics(
        price: Option<Decimal>,
        baseline: Option<Decimal>,
        amount: Decimal,
        percent: Decimal,
    ) {
        assert_eq!(derive_change(price, baseline), (amount, percent));
    }

    #[test]
    fn concurrent_reads_during_ingest() {
        use std::thread;

        let cache = Arc::new(tracked("AAPL"));
        let writer = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 1..=500_i64 {
                    cache.ingest(push("AAPL", Decimal::from(i), i));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    let mut last = Decimal::ZERO;
                    for _ in 0..500 {
                        if let Some(price) = cache.read("AAPL").and_then(|v| v.price) {
                            assert!(price >= last);
                            last = price;
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(cache.read("AAPL").unwrap().price, Some(dec!(500)));
    }

    proptest! {
        #[test]
        fn price_tracks_max_accepted_observation(
            events in prop::collection::vec((0_i64..50, 1_i64..1_000, any::<bool>()), 1..60)
        ) {
            let cache = tracked("AAPL");
            let mut best: Option<(i64, Decimal)> = None;

            for (observed, price, is_push) in events {
                let price = Decimal::from(price);
                let before = cache.read("AAPL").and_then(|v| v.price);
                let record = if is_push {
                    push("AAPL", price, observed * 1_000)
                } else {
                    snapshot("AAPL", price, observed * 1_000, observed * 1_000)
                };
                let outcome = cache.ingest(record);

                match outcome {
                    IngestOutcome::Accepted => {
                        if let Some((t, _)) = best {
                            prop_assert!(observed >= t);
                        }
                        best = Some((observed, price));
                    }
                    _ => {
                        prop_assert_eq!(cache.read("AAPL").and_then(|v| v.price), before);
                    }
                }

                let observed_at = cache.read("AAPL").and_then(|v| v.observed_at);
                prop_assert_eq!(observed_at, best.map(|(t, _)| at_ms(t * 1_000)));
            }

            prop_assert_eq!(cache.read("AAPL").and_then(|v| v.price), best.map(|(_, p)| p));
        }
    }
}
