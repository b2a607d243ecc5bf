//! Subscription Multiplexer
//!
//! Reference-counts symbol interest across consumer handles and decides
//! which subscribe/unsubscribe messages the push source needs.
//!
//! # Design
//!
//! The multiplexer tracks:
//! - Which symbols each handle owns
//! - A reference count per symbol
//! - A debounce deadline for symbols whose count dropped to zero
//!
//! A symbol that comes back before its deadline is never unsubscribed
//! upstream. The set of symbols that must be live on the push source is
//! always recomputable from the counts, which is what reconnect replay
//! uses.
//!
//! This type is not synchronised. The hub wraps it in a mutex together
//! with cache tracking so that interest changes and evictions stay atomic.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use super::quote::Symbol;

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a consumer handle.
pub type HandleId = u64;

/// A symbol together with its resolved class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInterest {
    /// Instrument symbol.
    pub symbol: Symbol,
    /// Class name the symbol resolved to.
    pub class: String,
    /// Whether the push source carries this symbol.
    pub push_enabled: bool,
}

impl SymbolInterest {
    /// Create an interest entry.
    #[must_use]
    pub fn new(symbol: Symbol, class: impl Into<String>, push_enabled: bool) -> Self {
        Self {
            symbol,
            class: class.into(),
            push_enabled,
        }
    }
}

#[derive(Debug)]
struct SymbolEntry {
    class: String,
    push_enabled: bool,
    refcount: usize,
    unsubscribe_at: Option<Instant>,
}

// =============================================================================
// Multiplexer
// =============================================================================

/// Reference-counted symbol interest.
///
/// # Example
///
/// ```rust
/// use std::time::{Duration, Instant};
/// use quote_sync::domain::quote::Symbol;
/// use quote_sync::domain::subscription::{SubscriptionMultiplexer, SymbolInterest};
///
/// let mut mux = SubscriptionMultiplexer::new(Duration::from_secs(3));
/// let aapl = SymbolInterest::new(Symbol::parse("AAPL").unwrap(), "default", true);
///
/// // First handle needs an upstream subscribe
/// assert_eq!(mux.add_interest(1, &[aapl.clone()]).len(), 1);
/// // Second handle shares it
/// assert!(mux.add_interest(2, &[aapl]).is_empty());
///
/// let now = Instant::now();
/// assert!(mux.remove_interest(1, now).is_empty());
/// assert_eq!(mux.remove_interest(2, now).len(), 1);
///
/// // Unsubscribe is only due after the debounce
/// assert!(mux.drain_expired(now).is_empty());
/// assert_eq!(mux.drain_expired(now + Duration::from_secs(3)).len(), 1);
/// ```
#[derive(Debug)]
pub struct SubscriptionMultiplexer {
    debounce: Duration,
    handles: HashMap<HandleId, BTreeSet<Symbol>>,
    symbols: HashMap<Symbol, SymbolEntry>,
}

impl SubscriptionMultiplexer {
    /// Create a multiplexer with the given unsubscribe debounce.
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            handles: HashMap::new(),
            symbols: HashMap::new(),
        }
    }

    /// Register a handle's interest in a set of symbols.
    ///
    /// Returns push-enabled symbols whose refcount went 0→1, including
    /// those whose unsubscribe was still pending: the connection may have
    /// been replaced during the debounce, so the supervisor decides whether
    /// the symbol is already live upstream. The class of a symbol is taken
    /// from its first registration.
    pub fn add_interest(&mut self, handle: HandleId, interests: &[SymbolInterest]) -> Vec<Symbol> {
        let owned = self.handles.entry(handle).or_default();
        let mut subscribe = Vec::new();

        for interest in interests {
            if !owned.insert(interest.symbol.clone()) {
                continue;
            }

            let entry = self
                .symbols
                .entry(interest.symbol.clone())
                .or_insert_with(|| SymbolEntry {
                    class: interest.class.clone(),
                    push_enabled: interest.push_enabled,
                    refcount: 0,
                    unsubscribe_at: None,
                });
            entry.refcount += 1;

            if entry.refcount == 1 {
                entry.unsubscribe_at = None;
                if entry.push_enabled {
                    subscribe.push(interest.symbol.clone());
                }
            }
        }

        subscribe
    }

    /// Remove every symbol a handle owns.
    ///
    /// Returns symbols whose refcount dropped to zero. They are scheduled
    /// for unsubscription at `now + debounce`. Unknown handles are ignored.
    pub fn remove_interest(&mut self, handle: HandleId, now: Instant) -> Vec<Symbol> {
        let Some(owned) = self.handles.remove(&handle) else {
            return vec![];
        };

        let deadline = now + self.debounce;
        let mut scheduled = Vec::new();

        for symbol in owned {
            if let Some(entry) = self.symbols.get_mut(&symbol) {
                entry.refcount = entry.refcount.saturating_sub(1);

                if entry.refcount == 0 {
                    entry.unsubscribe_at = Some(deadline);
                    scheduled.push(symbol);
                }
            }
        }

        scheduled
    }

    /// Take every symbol whose debounce deadline has passed.
    ///
    /// These are the unsubscribe intents. Entries are forgotten, so a later
    /// subscribe starts a fresh 0→1 transition.
    pub fn drain_expired(&mut self, now: Instant) -> Vec<SymbolInterest> {
        let expired: Vec<Symbol> = self
            .symbols
            .iter()
            .filter(|(_, entry)| {
                entry.refcount == 0 && entry.unsubscribe_at.is_some_and(|at| at <= now)
            })
            .map(|(symbol, _)| symbol.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|symbol| {
                self.symbols.remove(&symbol).map(|entry| SymbolInterest {
                    symbol,
                    class: entry.class,
                    push_enabled: entry.push_enabled,
                })
            })
            .collect()
    }

    /// The minimal set of symbols that must be live on the push source.
    #[must_use]
    pub fn current_subscription_set(&self) -> BTreeSet<Symbol> {
        self.symbols
            .iter()
            .filter(|(_, entry)| entry.push_enabled && entry.refcount > 0)
            .map(|(symbol, _)| symbol.clone())
            .collect()
    }

    /// Number of handles interested in a symbol.
    #[must_use]
    pub fn ref_count(&self, symbol: &str) -> usize {
        self.symbols.get(symbol).map_or(0, |entry| entry.refcount)
    }

    /// Symbols of a class with at least one interested handle.
    #[must_use]
    pub fn active_symbols_in_class(&self, class: &str) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self
            .symbols
            .iter()
            .filter(|(_, entry)| entry.refcount > 0 && entry.class == class)
            .map(|(symbol, _)| symbol.clone())
            .collect();
        symbols.sort();
        symbols
    }

    /// Symbols owned by a handle.
    #[must_use]
    pub fn handle_symbols(&self, handle: HandleId) -> Option<&BTreeSet<Symbol>> {
        self.handles.get(&handle)
    }

    /// Whether a handle is registered.
    #[must_use]
    pub fn contains_handle(&self, handle: HandleId) -> bool {
        self.handles.contains_key(&handle)
    }

    /// Current counts.
    #[must_use]
    pub fn stats(&self) -> MultiplexerStats {
        let active = self.symbols.values().filter(|e| e.refcount > 0).count();
        MultiplexerStats {
            handle_count: self.handles.len(),
            active_symbols: active,
            pending_unsubscribes: self.symbols.len() - active,
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Multiplexer counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MultiplexerStats {
    /// Registered handles.
    pub handle_count: usize,
    /// Symbols with refcount > 0.
    pub active_symbols: usize,
    /// Symbols waiting out their debounce.
    pub pending_unsubscribes: usize,
}

// =============================================================================
// Tests
// =============================================================================
