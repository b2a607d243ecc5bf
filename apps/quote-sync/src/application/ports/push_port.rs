//! Push Source Port (Driven Port)
//!
//! Interface for the persistent bidirectional quote feed. The supervisor
//! owns one [`PushConnection`] at a time and is its only writer; a
//! [`PushConnector`] creates a fresh one on every (re)connect.

use async_trait::async_trait;

use crate::domain::quote::{QuoteRecord, Symbol};

/// Client-to-server command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Start receiving quotes for these symbols.
    Subscribe(Vec<Symbol>),
    /// Stop receiving quotes for these symbols.
    Unsubscribe(Vec<Symbol>),
    /// Keepalive probe.
    Ping,
}

impl ClientCommand {
    /// Label used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Subscribe(_) => "subscribe",
            Self::Unsubscribe(_) => "unsubscribe",
            Self::Ping => "ping",
        }
    }
}

/// Decoded server-to-client event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// Price observation.
    Quote(QuoteRecord),
    /// Server confirmed a subscription.
    SubscriptionAck(Vec<Symbol>),
    /// Heartbeat, ping or pong from the server.
    Heartbeat,
    /// An element that could not be decoded. The connection stays up.
    Malformed(String),
}

/// Push transport failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Handshake failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Writing a frame failed.
    #[error("send failed: {0}")]
    Send(String),

    /// Reading a frame failed.
    #[error("receive failed: {0}")]
    Receive(String),
}

/// One established push connection.
#[async_trait]
pub trait PushConnection: Send {
    /// Send a command.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Send`] if the frame cannot be written.
    async fn send(&mut self, command: ClientCommand) -> Result<(), TransportError>;

    /// Wait for the next event.
    ///
    /// Returns `None` when the server closed the connection. Must be
    /// cancel-safe: dropping the future loses no event.
    async fn next_event(&mut self) -> Option<Result<PushEvent, TransportError>>;

    /// Close the connection.
    async fn close(&mut self);
}

/// Factory for push connections.
#[async_trait]
pub trait PushConnector: Send + Sync {
    /// Perform the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] if the handshake fails.
    async fn connect(&self) -> Result<Box<dyn PushConnection>, TransportError>;
}
