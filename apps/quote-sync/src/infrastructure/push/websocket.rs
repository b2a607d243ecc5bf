//! WebSocket Push Adapter
//!
//! [`PushConnector`] over `tokio-tungstenite`. Each connect opens a fresh
//! socket; decoded events from multi-element frames are buffered so
//! [`PushConnection::next_event`] hands them out one at a time.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::codec::JsonCodec;
use crate::application::ports::{
    ClientCommand, PushConnection, PushConnector, PushEvent, TransportError,
};

/// Default handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector for a `ws://` or `wss://` push endpoint.
#[derive(Debug, Clone)]
pub struct WsPushConnector {
    url: String,
    connect_timeout: Duration,
    codec: JsonCodec,
}

impl WsPushConnector {
    /// Create a connector for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            codec: JsonCodec::new(),
        }
    }

    /// Override the handshake timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PushConnector for WsPushConnector {
    async fn connect(&self) -> Result<Box<dyn PushConnection>, TransportError> {
        tracing::debug!(url = %self.url, "Connecting to push source");

        let handshake = tokio_tungstenite::connect_async(self.url.as_str());
        let (stream, _response) = tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| TransportError::Connect("handshake timed out".to_string()))?
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        Ok(Box::new(WsPushConnection {
            stream,
            codec: self.codec.clone(),
            pending: VecDeque::new(),
        }))
    }
}

/// One open WebSocket session.
struct WsPushConnection {
    stream: WsStream,
    codec: JsonCodec,
    pending: VecDeque<PushEvent>,
}

impl WsPushConnection {
    fn decode_into_pending(&mut self, text: &str) {
        match self.codec.decode(text) {
            Ok(events) => self.pending.extend(events),
            Err(e) => self.pending.push_back(PushEvent::Malformed(e.to_string())),
        }
    }
}

#[async_trait]
impl PushConnection for WsPushConnection {
    async fn send(&mut self, command: ClientCommand) -> Result<(), TransportError> {
        let json = self
            .codec
            .encode(&command)
            .map_err(|e| TransportError::Send(e.to_string()))?;

        tracing::trace!(kind = command.kind(), "Sending push frame");

        self.stream
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn next_event(&mut self) -> Option<Result<PushEvent, TransportError>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }

            // tungstenite answers server pings on its own
            match self.stream.next().await? {
                Ok(Message::Text(text)) => self.decode_into_pending(text.as_str()),
                Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                    Ok(text) => self.decode_into_pending(text),
                    Err(e) => return Some(Ok(PushEvent::Malformed(e.to_string()))),
                },
                Ok(Message::Ping(_) | Message::Pong(_)) => return Some(Ok(PushEvent::Heartbeat)),
                Ok(Message::Close(frame)) => {
                    tracing::info!(frame = ?frame, "Push source sent close frame");
                    return None;
                }
                Ok(Message::Frame(_)) => {}
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "Push socket close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refused_connection_is_a_connect_error() {
        // Port 9 (discard) is closed on test hosts.
        let connector = WsPushConnector::new("ws://127.0.0.1:9/quotes")
            .with_connect_timeout(Duration::from_secs(2));

        let result = connector.connect().await;

        assert!(matches!(result, Err(TransportError::Connect(_))));
    }

    #[tokio::test]
    async fn round_trips_frames_with_a_local_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();

            let Some(Ok(Message::Text(subscribe))) = ws.next().await else {
                panic!("expected subscribe frame");
            };
            ws.send(Message::Text(
                r#"[{"type":"subscriptionAck","symbols":["AAPL"]},{"type":"quote","symbol":"AAPL","price":"1.5","timestamp":1}]"#.into(),
            ))
            .await
            .unwrap();
            ws.close(None).await.unwrap();
            subscribe.as_str().to_string()
        });

        let connector = WsPushConnector::new(format!("ws://{addr}"));
        let mut connection = connector.connect().await.unwrap();
        connection
            .send(ClientCommand::Subscribe(vec![
                crate::domain::quote::Symbol::parse("AAPL").unwrap(),
            ]))
            .await
            .unwrap();

        let ack = connection.next_event().await.unwrap().unwrap();
        assert!(matches!(ack, PushEvent::SubscriptionAck(ref s) if s.len() == 1));
        let quote = connection.next_event().await.unwrap().unwrap();
        assert!(matches!(quote, PushEvent::Quote(_)));
        assert!(connection.next_event().await.is_none());

        assert_eq!(
            server.await.unwrap(),
            r#"{"type":"subscribe","symbols":["AAPL"]}"#
        );
    }

    #[test]
    fn url_is_kept() {
        let connector = WsPushConnector::new("wss://feed.example.com/quotes");
        assert_eq!(connector.url(), "wss://feed.example.com/quotes");
    }
}
