//! HTTP Snapshot Adapter
//!
//! [`SnapshotSource`] backed by a JSON HTTP endpoint:
//!
//! ```text
//! GET {base_url}?symbols=AAPL,MSFT&range=1d
//! [{"symbol": "AAPL", "price": 150.25, "timestamp": 1709294400000, "volume": 1200}]
//! ```
//!
//! Symbols the endpoint does not know are simply absent from the array.
//! Elements that fail to decode are skipped with a warning.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::push::messages::WireTimestamp;
use crate::application::ports::{SnapshotError, SnapshotRequest, SnapshotSource};
use crate::domain::quote::{QuoteRecord, Symbol};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// One element of the snapshot response.
#[derive(Debug, Deserialize)]
struct SnapshotQuote {
    symbol: String,
    price: Decimal,
    timestamp: WireTimestamp,
    #[serde(default)]
    volume: Option<Decimal>,
}

/// Snapshot source over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSnapshotSource {
    /// Create a source for `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Transport`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SnapshotError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SnapshotError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self, request: &SnapshotRequest) -> Result<Vec<QuoteRecord>, SnapshotError> {
        let symbols = request
            .symbols
            .iter()
            .map(Symbol::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("symbols", symbols.as_str()), ("range", request.range.as_str())])
            .send()
            .await
            .map_err(|e| SnapshotError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SnapshotError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| SnapshotError::Transport(e.to_string()))?;

        parse_snapshot_body(&body)
    }
}

/// Decode a snapshot response body.
///
/// # Errors
///
/// Returns [`SnapshotError::InvalidBody`] if the body is not a JSON array.
/// Individual bad elements are skipped.
pub fn parse_snapshot_body(body: &str) -> Result<Vec<QuoteRecord>, SnapshotError> {
    let elements: Vec<serde_json::Value> =
        serde_json::from_str(body).map_err(|e| SnapshotError::InvalidBody(e.to_string()))?;

    let mut records = Vec::with_capacity(elements.len());
    for element in elements {
        match decode_element(element) {
            Ok(record) => records.push(record),
            Err(reason) => tracing::warn!(reason = %reason, "Skipping malformed snapshot element"),
        }
    }
    Ok(records)
}

fn decode_element(value: serde_json::Value) -> Result<QuoteRecord, String> {
    let quote: SnapshotQuote = serde_json::from_value(value).map_err(|e| e.to_string())?;
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

    Ok(QuoteRecord::snapshot(symbol, quote.price, observed_at).with_volume(quote.volume))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::Router;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::quote::QuoteSource;

    #[test]
    fn parses_mixed_number_and_string_fields() {
        let body = r#"[
            {"symbol":"AAPL","price":150.25,"timestamp":1709294400000,"volume":"1200"},
            {"symbol":"^GSPC","price":"5100.1","timestamp":"2024-03-01T16:00:00Z"}
        ]"#;

        let records = parse_snapshot_body(body).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].price(), dec!(150.25));
        assert_eq!(records[0].volume(), Some(dec!(1200)));
        assert_eq!(records[0].source(), QuoteSource::Snapshot);
        assert_eq!(records[1].symbol().as_str(), "^GSPC");
        assert_eq!(records[1].volume(), None);
    }

    #[test]
    fn skips_malformed_elements() {
        let body = r#"[
            {"symbol":"AAPL","price":"n/a","timestamp":1},
            {"symbol":"MSFT","timestamp":1},
            {"symbol":"","price":1,"timestamp":1},
            "garbage",
            {"symbol":"NVDA","price":900,"timestamp":1,"volume":"-5"},
            {"symbol":"TSLA","price":200,"timestamp":1}
        ]"#;

        let records = parse_snapshot_body(body).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol().as_str(), "TSLA");
    }

    #[test]
    fn non_array_body_is_invalid() {
        assert!(matches!(
            parse_snapshot_body(r#"{"error":"oops"}"#),
            Err(SnapshotError::InvalidBody(_))
        ));
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}/quotes")
    }

    #[tokio::test]
    async fn fetch_sends_symbols_and_range() {
        let router = Router::new().route(
            "/quotes",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("symbols").map(String::as_str), Some("AAPL,MSFT"));
                assert_eq!(params.get("range").map(String::as_str), Some("1d"));
                r#"[{"symbol":"AAPL","price":"150","timestamp":1}]"#
            }),
        );
        let source = HttpSnapshotSource::new(serve(router).await, DEFAULT_TIMEOUT).unwrap();

        let records = source
            .fetch(&SnapshotRequest {
                symbols: vec![Symbol::parse("AAPL").unwrap(), Symbol::parse("MSFT").unwrap()],
                range: "1d".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].price(), dec!(150));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let router = Router::new().route(
            "/quotes",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy") }),
        );
        let source = HttpSnapshotSource::new(serve(router).await, DEFAULT_TIMEOUT).unwrap();

        let result = source
            .fetch(&SnapshotRequest {
                symbols: vec![Symbol::parse("AAPL").unwrap()],
                range: "1d".to_string(),
            })
            .await;

        assert_eq!(result, Err(SnapshotError::Status { status: 503 }));
    }
}
