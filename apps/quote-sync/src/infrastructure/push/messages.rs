//! Push Feed Wire Types
//!
//! JSON frame shapes exchanged with the push source.
//!
//! # Client to server
//! ```json
//! {"type": "subscribe", "symbols": ["AAPL", "BTCUSDT"]}
//! {"type": "unsubscribe", "symbols": ["AAPL"]}
//! {"type": "ping"}
//! ```
//!
//! # Server to client
//! ```json
//! {"type": "quote", "symbol": "AAPL", "price": 150.25, "volume": "1200", "timestamp": 1709300000000}
//! {"type": "subscriptionAck", "symbols": ["AAPL"]}
//! {"type": "heartbeat"}
//! ```
//!
//! A frame carries either one object or an array of them. Unknown fields
//! are ignored.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::quote::Symbol;

// =============================================================================
// Client Frames
// =============================================================================

/// Frame sent to the push source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Add symbols to the upstream subscription.
    Subscribe {
        /// Symbols to add.
        symbols: Vec<Symbol>,
    },
    /// Remove symbols from the upstream subscription.
    Unsubscribe {
        /// Symbols to remove.
        symbols: Vec<Symbol>,
    },
    /// Keepalive.
    Ping,
}

// =============================================================================
// Server Frames
// =============================================================================

/// One element of a server frame, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Price observation.
    Quote(QuoteMessage),
    /// Subscription confirmation.
    SubscriptionAck {
        /// Symbols now subscribed.
        #[serde(default)]
        symbols: Vec<String>,
    },
    /// Server heartbeat.
    Heartbeat,
    /// Server ping.
    Ping,
    /// Reply to our ping.
    Pong,
}

/// Quote payload.
///
/// `price` and `volume` accept JSON numbers or numeric strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuoteMessage {
    /// Instrument symbol.
    pub symbol: String,

    /// Last price.
    pub price: Decimal,

    /// Traded volume, when the feed carries it.
    #[serde(default)]
    pub volume: Option<Decimal>,

    /// Source timestamp.
    pub timestamp: WireTimestamp,
}

/// Timestamp as epoch milliseconds or an RFC 3339 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    /// Milliseconds since the Unix epoch.
    Millis(i64),
    /// RFC 3339 text.
    Text(DateTime<Utc>),
}

impl WireTimestamp {
    /// Convert to UTC. Returns `None` for out-of-range epoch values.
    #[must_use]
    pub fn to_utc(self) -> Option<DateTime<Utc>> {
        match self {
            Self::Millis(ms) => DateTime::from_timestamp_millis(ms),
            Self::Text(ts) => Some(ts),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn client_frames_use_camel_case_type_tag() {
        let frame = ClientFrame::Subscribe {
            symbols: vec![Symbol::parse("AAPL").unwrap()],
        };
        assert_eq!(
            serde_json::to_string(&frame).unwrap(),
            r#"{"type":"subscribe","symbols":["AAPL"]}"#
        );
        assert_eq!(
            serde_json::to_string(&ClientFrame::Ping).unwrap(),
            r#"{"type":"ping"}"#
        );
    }

    #[test]
    fn quote_accepts_string_and_number_fields() {
        let json = r#"{"type":"quote","symbol":"BTCUSDT","price":"50000.5","volume":12,"timestamp":"2024-03-01T12:00:00Z","venue":"x"}"#;
        let ServerMessage::Quote(quote) = serde_json::from_str(json).unwrap() else {
            panic!("expected quote");
        };
        assert_eq!(quote.price, dec!(50000.5));
        assert_eq!(quote.volume, Some(dec!(12)));
        assert_eq!(
            quote.timestamp.to_utc().unwrap().to_rfc3339(),
            "2024-03-01T12:00:00+00:00"
        );
    }

    #[test]
    fn millis_timestamp_converts() {
        let ts = WireTimestamp::Millis(1_709_294_400_000);
        assert_eq!(ts.to_utc().unwrap().timestamp_millis(), 1_709_294_400_000);
        assert!(WireTimestamp::Millis(i64::MAX).to_utc().is_none());
    }

    #[test]
    fn ack_and_heartbeat_decode() {
        let ack: ServerMessage =
            serde_json::from_str(r#"{"type":"subscriptionAck","symbols":["AAPL"]}"#).unwrap();
        assert_eq!(
            ack,
            ServerMessage::SubscriptionAck {
                symbols: vec!["AAPL".to_string()]
            }
        );

        let hb: ServerMessage = serde_json::from_str(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(hb, ServerMessage::Heartbeat);
    }
}
