//! Configuration Module
//!
//! Environment-driven configuration for the quote sync service.

mod settings;

pub use settings::{
    ConfigError, ConnectionSettings, PushSettings, ServerSettings, SnapshotSettings, SyncConfig,
    SyncSettings,
};
