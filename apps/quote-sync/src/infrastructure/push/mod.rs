//! Push Feed Adapter
//!
//! WebSocket implementation of the push source port.
//!
//! - `messages`: JSON wire types
//! - `codec`: per-element frame decoding and command encoding
//! - `websocket`: `tokio-tungstenite` connector and connection

pub mod codec;
pub mod messages;
pub mod websocket;

pub use codec::{CodecError, JsonCodec};
pub use websocket::WsPushConnector;
