//! Error types for the trends tracker

use thiserror::Error;

use crate::store::StoreError;

/// Result type for trends tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Errors that can occur while scraping, comparing, or persisting trend records
#[derive(Error, Debug)]
pub enum TrackerError {
    /// A raw row has no usable player identity
    #[error("Malformed row {index}: {reason}")]
    MalformedRow { index: usize, reason: String },

    /// The persistence backend cannot be reached; aborts the batch
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Looking up the previous record for one player failed
    #[error("Query failed for player {player}: {reason}")]
    Query { player: String, reason: String },

    /// Inserting a new record for one player failed
    #[error("Insert failed for player {player}: {reason}")]
    Insert { player: String, reason: String },

    /// A read against the store failed outside of a batch
    #[error("Store query failed: {0}")]
    Store(String),

    #[error("Page fetch failed: {0}")]
    Fetch(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TrackerError {
    /// Create a new malformed row error
    pub fn malformed_row(index: usize, reason: impl Into<String>) -> Self {
        Self::MalformedRow { index, reason: reason.into() }
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error should abort the whole batch rather than a single row
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Migration(_) | Self::Config(_))
    }
}

impl From<config::ConfigError> for TrackerError {
    fn from(err: config::ConfigError) -> Self {
        TrackerError::Config(err.to_string())
    }
}

impl From<StoreError> for TrackerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => TrackerError::StoreUnavailable(msg),
            StoreError::Query(msg) => TrackerError::Store(msg),
        }
    }
}
