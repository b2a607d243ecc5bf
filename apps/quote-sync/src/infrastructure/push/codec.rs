//! Push Frame Codec
//!
//! Turns inbound text frames into [`PushEvent`]s and outbound
//! [`ClientCommand`]s into text frames.
//!
//! Decoding is per element: one bad element in an array frame becomes a
//! [`PushEvent::Malformed`] and the remaining elements are still decoded.
//! Only a frame that is not JSON at all fails as a whole.

use super::messages::{ClientFrame, QuoteMessage, ServerMessage};
use crate::application::ports::{ClientCommand, PushEvent};
use crate::domain::quote::{QuoteRecord, Symbol};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame was neither an object nor an array.
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the push feed.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object or array.
    pub fn decode(&self, text: &str) -> Result<Vec<PushEvent>, CodecError> {
        let value: serde_json::Value = serde_json::from_str(text.trim())?;

        match value {
            serde_json::Value::Array(elements) => {
                Ok(elements.into_iter().map(|e| self.decode_element(e)).collect())
            }
            element @ serde_json::Value::Object(_) => Ok(vec![self.decode_element(element)]),
            other => Err(CodecError::InvalidFormat(format!(
                "expected JSON array or object, got: {}",
                truncate(&other.to_string(), 50)
            ))),
        }
    }

    fn decode_element(&self, value: serde_json::Value) -> PushEvent {
        let message: ServerMessage = match serde_json::from_value(value) {
            Ok(message) => message,
            Err(e) => return PushEvent::Malformed(e.to_string()),
        };

        match message {
            ServerMessage::Quote(quote) => match quote_record(quote) {
                Ok(record) => PushEvent::Quote(record),
                Err(reason) => PushEvent::Malformed(reason),
            },
            ServerMessage::SubscriptionAck { symbols } => PushEvent::SubscriptionAck(
                symbols
                    .iter()
                    .filter_map(|s| Symbol::parse(s).ok())
                    .collect(),
            ),
            ServerMessage::Heartbeat | ServerMessage::Ping | ServerMessage::Pong => {
                PushEvent::Heartbeat
            }
        }
    }

    /// Encode a command as a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self, command: &ClientCommand) -> Result<String, CodecError> {
        let frame = match command {
            ClientCommand::Subscribe(symbols) => ClientFrame::Subscribe {
                symbols: symbols.clone(),
            },
            ClientCommand::Unsubscribe(symbols) => ClientFrame::Unsubscribe {
                symbols: symbols.clone(),
            },
            ClientCommand::Ping => ClientFrame::Ping,
        };
        Ok(serde_json::to_string(&frame)?)
    }
}

fn quote_record(quote: QuoteMessage) -> Result<QuoteRecord, String> {
    let symbol = Symbol::parse(&quote.symbol).map_err(|e| e.to_string())?;

    if quote.price.is_sign_negative() {
        return Err(format!("negative price for {symbol}"));
    }
    if quote.volume.is_some_and(|v| v.is_sign_negative()) {
        return Err(format!("negative volume for {symbol}"));
    }

    let observed_at = quote
        .timestamp
        .to_utc()
        .ok_or_else(|| format!("timestamp out of range for {symbol}"))?;

    Ok(QuoteRecord::push(symbol, quote.price, observed_at).with_volume(quote.volume))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
