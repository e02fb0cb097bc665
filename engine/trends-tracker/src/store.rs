//! Trend store abstraction and in-memory implementation

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::types::PlayerTrendRecord;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by a trend store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend cannot be reached (connection, pool, I/O)
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend answered but the operation failed
    #[error("store operation failed: {0}")]
    Query(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            _ => StoreError::Query(err.to_string()),
        }
    }
}

/// Append-only storage of trend records, keyed by player name and week
#[async_trait]
pub trait TrendStore: Send + Sync {
    /// Latest stored record (maximum `scraped_at`) for the player and week
    async fn query_latest(
        &self,
        player_name: &str,
        week: u32,
    ) -> StoreResult<Option<PlayerTrendRecord>>;

    /// Append a new record
    async fn insert(&self, record: &PlayerTrendRecord) -> StoreResult<()>;
}

/// Read-side queries used by reports
#[async_trait]
pub trait TrendHistory: Send + Sync {
    /// Every record whose player name contains `player_name` (case-insensitive), oldest first
    async fn player_history(&self, player_name: &str) -> StoreResult<Vec<PlayerTrendRecord>>;

    /// The most recently scraped records, newest first
    async fn latest_records(&self, limit: usize) -> StoreResult<Vec<PlayerTrendRecord>>;

    /// Every stored record, oldest first
    async fn all_records(&self) -> StoreResult<Vec<PlayerTrendRecord>>;
}

/// In-memory store used for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryTrendStore {
    records: RwLock<Vec<PlayerTrendRecord>>,
}

impl MemoryTrendStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records
    pub fn with_records(records: Vec<PlayerTrendRecord>) -> Self {
        Self { records: RwLock::new(records) }
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store holds no records
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl TrendStore for MemoryTrendStore {
    async fn query_latest(
        &self,
        player_name: &str,
        week: u32,
    ) -> StoreResult<Option<PlayerTrendRecord>> {
        let records = self.records.read().await;

        // max_by_key keeps the last maximum, so later inserts win timestamp ties
        Ok(records
            .iter()
            .filter(|r| r.player_name == player_name && r.week == week)
            .max_by_key(|r| r.scraped_at)
            .cloned())
    }

    async fn insert(&self, record: &PlayerTrendRecord) -> StoreResult<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl TrendHistory for MemoryTrendStore {
    async fn player_history(&self, player_name: &str) -> StoreResult<Vec<PlayerTrendRecord>> {
        let needle = player_name.to_lowercase();
        let mut history: Vec<PlayerTrendRecord> = self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.player_name.to_lowercase().contains(&needle))
            .cloned()
            .collect();

        history.sort_by_key(|r| r.scraped_at);
        Ok(history)
    }

    async fn latest_records(&self, limit: usize) -> StoreResult<Vec<PlayerTrendRecord>> {
        let mut records = self.all_records().await?;
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }

    async fn all_records(&self) -> StoreResult<Vec<PlayerTrendRecord>> {
        let mut records = self.records.read().await.clone();
        records.sort_by_key(|r| r.scraped_at);
        Ok(records)
    }
}
