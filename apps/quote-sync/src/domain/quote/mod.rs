//! Quote Types
//!
//! Core value types for price observations: the validated [`Symbol`], the
//! immutable [`QuoteRecord`] produced by either source, and the derived
//! [`QuoteView`] handed to consumers.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Symbol
// =============================================================================

/// Maximum accepted symbol length.
pub const MAX_SYMBOL_LEN: usize = 32;

/// Errors raised when a symbol string is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    /// Symbol was empty or whitespace.
    #[error("symbol cannot be empty")]
    Empty,

    /// Symbol exceeded [`MAX_SYMBOL_LEN`].
    #[error("symbol {symbol:?} exceeds {max} characters")]
    TooLong {
        /// The offending symbol.
        symbol: String,
        /// Maximum allowed length.
        max: usize,
    },

    /// Symbol contained a character outside the allowed set.
    #[error("symbol {symbol:?} contains invalid character {found:?}")]
    InvalidCharacter {
        /// The offending symbol.
        symbol: String,
        /// First invalid character.
        found: char,
    },
}

/// A validated instrument identifier (e.g. `AAPL`, `BTCUSDT`, `^GSPC`).
///
/// Symbols are case-preserving. Allowed characters are ASCII alphanumerics
/// and `. - _ ^ / : =`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse and validate a symbol.
    ///
    /// Leading and trailing whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`SymbolError`] if the symbol is empty, too long, or contains
    /// characters outside the allowed set.
    pub fn parse(raw: &str) -> Result<Self, SymbolError> {
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(SymbolError::Empty);
        }

        if trimmed.len() > MAX_SYMBOL_LEN {
            return Err(SymbolError::TooLong {
                symbol: trimmed.to_string(),
                max: MAX_SYMBOL_LEN,
            });
        }

        if let Some(found) = trimmed.chars().find(|c| !is_symbol_char(*c)) {
            return Err(SymbolError::InvalidCharacter {
                symbol: trimmed.to_string(),
                found,
            });
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Borrow the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

const fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '^' | '/' | ':' | '=')
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for Symbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

// =============================================================================
// Quote Source
// =============================================================================

/// Origin of a price observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSource {
    /// Live push feed.
    Push,
    /// Polled snapshot (possibly delayed).
    Snapshot,
}

impl QuoteSource {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Snapshot => "snapshot",
        }
    }
}

// =============================================================================
// Quote Record
// =============================================================================

/// One observation of a symbol's price.
///
/// Immutable once constructed: fields are private and the `with_*`
/// builders consume `self` and return a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRecord {
    symbol: Symbol,
    price: Decimal,
    volume: Option<Decimal>,
    observed_at: DateTime<Utc>,
    received_at: DateTime<Utc>,
    source: QuoteSource,
}

impl QuoteRecord {
    /// Create a record. `received_at` defaults to now.
    #[must_use]
    pub fn new(
        symbol: Symbol,
        source: QuoteSource,
        price: Decimal,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol,
            price,
            volume: None,
            observed_at,
            received_at: Utc::now(),
            source,
        }
    }

    /// Create a push-sourced record.
    #[must_use]
    pub fn push(symbol: Symbol, price: Decimal, observed_at: DateTime<Utc>) -> Self {
        Self::new(symbol, QuoteSource::Push, price, observed_at)
    }

    /// Create a snapshot-sourced record.
    #[must_use]
    pub fn snapshot(symbol: Symbol, price: Decimal, observed_at: DateTime<Utc>) -> Self {
        Self::new(symbol, QuoteSource::Snapshot, price, observed_at)
    }

    /// Set the traded volume.
    #[must_use]
    pub const fn with_volume(mut self, volume: Option<Decimal>) -> Self {
        self.volume = volume;
        self
    }

    /// Set the local arrival time.
    #[must_use]
    pub const fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    /// Instrument symbol.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Observed price.
    #[must_use]
    pub const fn price(&self) -> Decimal {
        self.price
    }

    /// Observed volume, if the source reported one.
    #[must_use]
    pub const fn volume(&self) -> Option<Decimal> {
        self.volume
    }

    /// Source-reported observation time.
    #[must_use]
    pub const fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// Local arrival time.
    #[must_use]
    pub const fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Which source produced this record.
    #[must_use]
    pub const fn source(&self) -> QuoteSource {
        self.source
    }
}

// =============================================================================
// Quote View
// =============================================================================

/// Consumer-facing read model for one symbol.
///
/// `price` is `None` while a symbol is tracked but nothing has been
/// accepted for it yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuoteView {
    /// Instrument symbol.
    pub symbol: Symbol,
    /// Latest accepted price.
    pub price: Option<Decimal>,
    /// Latest known volume.
    pub volume: Option<Decimal>,
    /// `price - baseline`, zero when no baseline exists.
    pub change_amount: Decimal,
    /// `change_amount / baseline * 100`, zero when the baseline is zero or absent.
    pub change_percent: Decimal,
    /// True while a push observation is within the freshness window.
    pub is_live: bool,
    /// Milliseconds since the latest accepted observation arrived, when not live.
    pub stale_since_ms: Option<i64>,
    /// Source of the latest accepted observation.
    pub source: Option<QuoteSource>,
    /// Source timestamp of the latest accepted observation.
    pub observed_at: Option<DateTime<Utc>>,
}
