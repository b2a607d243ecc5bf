//! Port Interfaces
//!
//! Contracts the infrastructure adapters implement, following the
//! Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `PushConnector` / `PushConnection`: the live quote feed
//! - `SnapshotSource`: the polled snapshot/delayed-price source

mod push_port;
mod snapshot_port;

pub use push_port::{ClientCommand, PushConnection, PushConnector, PushEvent, TransportError};
#[cfg(test)]
pub use snapshot_port::MockSnapshotSource;
pub use snapshot_port::{SnapshotError, SnapshotRequest, SnapshotSource};
