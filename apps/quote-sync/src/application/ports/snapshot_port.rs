//! Snapshot Source Port (Driven Port)
//!
//! Interface for pulling the latest known price of a set of symbols.

use async_trait::async_trait;

use crate::domain::quote::{QuoteRecord, Symbol};

/// One poll request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRequest {
    /// Symbols to fetch.
    pub symbols: Vec<Symbol>,
    /// Day-range parameter (e.g. `1d`).
    pub range: String,
}

/// Snapshot fetch failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    /// Network-level failure or timeout.
    #[error("snapshot transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status.
    #[error("snapshot source returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Body could not be decoded at all.
    #[error("snapshot body invalid: {0}")]
    InvalidBody(String),
}

/// Port for the polled snapshot source.
///
/// Implementations return one [`QuoteRecord`] per symbol they know about,
/// with [`QuoteSource::Snapshot`](crate::domain::quote::QuoteSource::Snapshot).
/// Missing symbols are not an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the latest observations.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if the whole request failed.
    async fn fetch(&self, request: &SnapshotRequest) -> Result<Vec<QuoteRecord>, SnapshotError>;
}
