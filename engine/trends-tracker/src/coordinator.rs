//! Per-batch upsert coordination
//!
//! For each player: fetch the latest stored record for the batch week, compare,
//! and append a new row only when something changed. Row and player failures
//! are counted and the batch continues; an unreachable store aborts the batch.
//!
//! There is no locking across invocations. Two overlapping runs that read the
//! same previous record can both insert a near-identical row.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::DetectionConfig;
use crate::detector::{decide, ChangeDecision};
use crate::error::{Result, TrackerError};
use crate::normalizer::normalize;
use crate::store::{StoreError, TrendStore};
use crate::types::{PageSnapshot, PlayerTrendRecord};
use crate::week::{ResolvedWeek, WeekResolver};

/// How many changed players to list when the change ratio looks suspicious
const CHANGE_SAMPLE_SIZE: usize = 3;

/// A row or player that could not be processed
#[derive(Debug, Clone, Serialize)]
pub struct RowFailure {
    pub index: usize,
    pub player: Option<String>,
    pub reason: String,
}

/// Aggregate outcome of one scrape batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    /// Week shared by every record of the batch
    pub week: ResolvedWeek,
    /// Timestamp shared by every record of the batch
    pub scraped_at: DateTime<Utc>,
    /// Rows that normalized into a record
    pub processed: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Inserts with no previous record for the week
    pub baselines: usize,
    /// Inserts that replaced a previous version
    pub updated: usize,
    pub failures: Vec<RowFailure>,
}

impl BatchSummary {
    fn new(week: ResolvedWeek, scraped_at: DateTime<Utc>) -> Self {
        Self {
            week,
            scraped_at,
            processed: 0,
            inserted: 0,
            skipped: 0,
            failed: 0,
            baselines: 0,
            updated: 0,
            failures: Vec::new(),
        }
    }

    fn record_failure(&mut self, index: usize, player: Option<&str>, err: &TrackerError) {
        self.failed += 1;
        self.failures.push(RowFailure {
            index,
            player: player.map(str::to_string),
            reason: err.to_string(),
        });
    }

    /// Fraction of processed records that changed against a previous version
    pub fn update_ratio(&self) -> f64 {
        if self.processed == 0 {
            return 0.0;
        }
        self.updated as f64 / self.processed as f64
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "week {} ({}): inserted {} ({} new, {} updated), skipped {}, failed {}",
            self.week.week,
            self.week.source,
            self.inserted,
            self.baselines,
            self.updated,
            self.skipped,
            self.failed
        )
    }
}

enum PlayerOutcome {
    Inserted(ChangeDecision),
    Skipped,
}

/// Decides, per player, whether to skip or append a new version
pub struct UpsertCoordinator {
    store: Arc<dyn TrendStore>,
    week_resolver: WeekResolver,
    detection: DetectionConfig,
}

impl UpsertCoordinator {
    /// Create a new coordinator
    pub fn new(
        store: Arc<dyn TrendStore>,
        week_resolver: WeekResolver,
        detection: DetectionConfig,
    ) -> Self {
        Self { store, week_resolver, detection }
    }

    /// Process one scrape batch, stamped with the current time
    pub async fn run_batch(&self, snapshot: &PageSnapshot) -> Result<BatchSummary> {
        self.run_batch_at(snapshot, Utc::now()).await
    }

    /// Process one scrape batch with an explicit batch timestamp
    pub async fn run_batch_at(
        &self,
        snapshot: &PageSnapshot,
        scraped_at: DateTime<Utc>,
    ) -> Result<BatchSummary> {
        let week = self
            .week_resolver
            .resolve(snapshot.week_indicator.as_deref(), scraped_at.date_naive());
        let mut summary = BatchSummary::new(week, scraped_at);
        let mut changed_sample = Vec::new();

        info!(
            rows = snapshot.rows.len(),
            week = week.week,
            source = %week.source,
            "Starting change detection for batch"
        );

        for (index, raw) in snapshot.rows.iter().enumerate() {
            let record = match normalize(raw, index, week.week, scraped_at) {
                Ok(record) => record,
                Err(e) => {
                    warn!(index, "Skipping row: {}", e);
                    summary.record_failure(index, None, &e);
                    continue;
                }
            };
            summary.processed += 1;

            match self.process_record(&record).await {
                Ok(PlayerOutcome::Inserted(decision)) => {
                    summary.inserted += 1;
                    if decision.is_baseline() {
                        summary.baselines += 1;
                        debug!(player = %record.player_name, "New baseline");
                    } else {
                        summary.updated += 1;
                        debug!(player = %record.player_name, "Changed: {}", decision);
                        if changed_sample.len() < CHANGE_SAMPLE_SIZE {
                            changed_sample.push(record.player_name.clone());
                        }
                    }
                }
                Ok(PlayerOutcome::Skipped) => {
                    summary.skipped += 1;
                    debug!(player = %record.player_name, "No changes");
                }
                Err(e) if e.is_fatal() => {
                    error!(
                        player = %record.player_name,
                        inserted = summary.inserted,
                        "Aborting batch: {}",
                        e
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(player = %record.player_name, "Player failed: {}", e);
                    summary.record_failure(index, Some(&record.player_name), &e);
                }
            }
        }

        let ratio = summary.update_ratio();
        if ratio > self.detection.high_change_ratio {
            warn!(
                ratio = %format!("{:.1}%", ratio * 100.0),
                sample = ?changed_sample,
                "Unusually high share of changed players"
            );
        }

        info!("Batch complete: {}", summary);
        Ok(summary)
    }

    async fn process_record(&self, record: &PlayerTrendRecord) -> Result<PlayerOutcome> {
        let previous = self
            .store
            .query_latest(&record.player_name, record.week)
            .await
            .map_err(|e| match e {
                StoreError::Unavailable(msg) => TrackerError::StoreUnavailable(msg),
                StoreError::Query(reason) => {
                    TrackerError::Query { player: record.player_name.clone(), reason }
                }
            })?;

        let decision = decide(record, previous.as_ref());
        if !decision.changed {
            return Ok(PlayerOutcome::Skipped);
        }

        self.store.insert(record).await.map_err(|e| match e {
            StoreError::Unavailable(msg) => TrackerError::StoreUnavailable(msg),
            StoreError::Query(reason) => {
                TrackerError::Insert { player: record.player_name.clone(), reason }
            }
        })?;

        Ok(PlayerOutcome::Inserted(decision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeekConfig;
    use crate::store::{MemoryTrendStore, StoreResult};
    use crate::types::{columns, RawRow};
    use crate::week::WeekSource;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn batch_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 5, 18, 0, 0).unwrap()
    }

    fn row(name: &str, rostered: &str, opponent: &str) -> RawRow {
        RawRow::new()
            .with(columns::PLAYER_NAME, name)
            .with(columns::POSITION_TEAM, "QB - BUF")
            .with(columns::OPPONENT, opponent)
            .with(columns::PERCENT_ROSTERED, rostered)
            .with(columns::PERCENT_ROSTERED_CHANGE, "+2.1")
            .with(columns::PERCENT_STARTED, "88.2%")
            .with(columns::PERCENT_STARTED_CHANGE, "-0.3")
    }

    fn snapshot(rows: Vec<RawRow>, week: Option<&str>) -> PageSnapshot {
        PageSnapshot { rows, week_indicator: week.map(str::to_string) }
    }

    fn coordinator(store: Arc<dyn TrendStore>) -> UpsertCoordinator {
        UpsertCoordinator::new(
            store,
            WeekResolver::new(WeekConfig::default()),
            DetectionConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_first_run_inserts_baselines() {
        let store = Arc::new(MemoryTrendStore::new());
        let coordinator = coordinator(store.clone());

        let summary = coordinator
            .run_batch_at(&snapshot(vec![row("Josh Allen", "95.5%", "vs MIA")], Some("Week 5")), batch_time())
            .await
            .unwrap();

        assert_eq!(summary.week, ResolvedWeek { week: 5, source: WeekSource::Page });
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.baselines, 1);
        assert_eq!(summary.skipped, 0);

        let stored = store.query_latest("Josh Allen", 5).await.unwrap().unwrap();
        assert_eq!(stored.percent_rostered, Some(95.5));
        assert_eq!(stored.team, "BUF");
        assert_eq!(stored.scraped_at, batch_time());
    }

    #[tokio::test]
    async fn test_unchanged_rerun_inserts_nothing() {
        let store = Arc::new(MemoryTrendStore::new());
        let coordinator = coordinator(store.clone());
        let batch = snapshot(
            vec![row("Josh Allen", "95.5%", "vs MIA"), row("Travis Kelce", "96.2%", "vs LV")],
            Some("Week 5"),
        );

        coordinator.run_batch_at(&batch, batch_time()).await.unwrap();
        let summary =
            coordinator.run_batch_at(&batch, batch_time() + Duration::minutes(30)).await.unwrap();

        assert_eq!(summary.inserted, 0);
        assert_eq!(summary.skipped, 2);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_only_changed_players_are_written() {
        let store = Arc::new(MemoryTrendStore::new());
        let coordinator = coordinator(store.clone());

        let first = snapshot(
            vec![row("Josh Allen", "95.5%", "vs MIA"), row("Cooper Kupp", "89.4%", "vs LAR")],
            Some("Week 5"),
        );
        coordinator.run_batch_at(&first, batch_time()).await.unwrap();

        let second = snapshot(
            vec![row("Josh Allen", "95.6%", "vs MIA"), row("Cooper Kupp", "89.4%", "@ SEA")],
            Some("Week 5"),
        );
        let summary =
            coordinator.run_batch_at(&second, batch_time() + Duration::minutes(30)).await.unwrap();

        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.updated, 2);
        assert_eq!(store.len().await, 4);

        let kupp = store.query_latest("Cooper Kupp", 5).await.unwrap().unwrap();
        assert_eq!(kupp.opponent, "@ SEA");

        // Unchanged third run leaves history alone
        let summary =
            coordinator.run_batch_at(&second, batch_time() + Duration::minutes(60)).await.unwrap();
        assert_eq!(summary.inserted, 0);
        assert_eq!(store.len().await, 4);
    }

    #[tokio::test]
    async fn test_new_week_starts_new_baselines() {
        let store = Arc::new(MemoryTrendStore::new());
        let coordinator = coordinator(store.clone());
        let rows = vec![row("Josh Allen", "95.5%", "vs MIA")];

        coordinator.run_batch_at(&snapshot(rows.clone(), Some("Week 5")), batch_time()).await.unwrap();
        let summary = coordinator
            .run_batch_at(&snapshot(rows, Some("Week 6")), batch_time() + Duration::days(7))
            .await
            .unwrap();

        assert_eq!(summary.baselines, 1);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_player_in_batch_written_once() {
        let store = Arc::new(MemoryTrendStore::new());
        let coordinator = coordinator(store.clone());
        let batch = snapshot(
            vec![row("Josh Allen", "95.5%", "vs MIA"), row("Josh Allen", "95.5%", "vs MIA")],
            Some("Week 5"),
        );

        let summary = coordinator.run_batch_at(&batch, batch_time()).await.unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[tokio::test]
    async fn test_malformed_rows_are_counted() {
        let store = Arc::new(MemoryTrendStore::new());
        let coordinator = coordinator(store.clone());
        let batch = snapshot(
            vec![
                row("Josh Allen", "95.5%", "vs MIA"),
                RawRow::new().with(columns::OPPONENT, "vs KC"),
                row("Jalen Hurts", "97.0%", "@ DAL"),
            ],
            Some("Week 5"),
        );

        let summary = coordinator.run_batch_at(&batch, batch_time()).await.unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].index, 1);
        assert!(summary.failures[0].player.is_none());
    }

    #[tokio::test]
    async fn test_calendar_week_when_page_has_none() {
        let store = Arc::new(MemoryTrendStore::new());
        let coordinator = coordinator(store.clone());

        let summary = coordinator
            .run_batch_at(&snapshot(vec![row("Josh Allen", "95.5%", "vs MIA")], None), batch_time())
            .await
            .unwrap();

        // 2025-10-05 is 31 days after the 2025-09-04 kickoff
        assert_eq!(summary.week, ResolvedWeek { week: 5, source: WeekSource::Calendar });
        assert!(store.query_latest("Josh Allen", 5).await.unwrap().is_some());
    }

    /// Store double that fails inserts for one player, or goes down after N inserts
    struct FlakyStore {
        inner: MemoryTrendStore,
        reject_player: Option<String>,
        available_inserts: Option<usize>,
        inserts: AtomicUsize,
    }

    #[async_trait]
    impl TrendStore for FlakyStore {
        async fn query_latest(
            &self,
            player_name: &str,
            week: u32,
        ) -> StoreResult<Option<PlayerTrendRecord>> {
            self.inner.query_latest(player_name, week).await
        }

        async fn insert(&self, record: &PlayerTrendRecord) -> StoreResult<()> {
            if self.reject_player.as_deref() == Some(record.player_name.as_str()) {
                return Err(StoreError::Query("value too long".to_string()));
            }
            if let Some(limit) = self.available_inserts {
                if self.inserts.load(Ordering::SeqCst) >= limit {
                    return Err(StoreError::Unavailable("connection reset".to_string()));
                }
            }
            self.inserts.fetch_add(1, Ordering::SeqCst);
            self.inner.insert(record).await
        }
    }

    #[tokio::test]
    async fn test_insert_failure_is_isolated() {
        let store = Arc::new(FlakyStore {
            inner: MemoryTrendStore::new(),
            reject_player: Some("Cooper Kupp".to_string()),
            available_inserts: None,
            inserts: AtomicUsize::new(0),
        });
        let coordinator = coordinator(store.clone());
        let batch = snapshot(
            vec![
                row("Josh Allen", "95.5%", "vs MIA"),
                row("Cooper Kupp", "89.4%", "vs LAR"),
                row("Jalen Hurts", "97.0%", "@ DAL"),
            ],
            Some("Week 5"),
        );

        let summary = coordinator.run_batch_at(&batch, batch_time()).await.unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].player.as_deref(), Some("Cooper Kupp"));
        assert_eq!(store.inner.len().await, 2);
    }

    #[tokio::test]
    async fn test_store_outage_aborts_batch_without_rollback() {
        let store = Arc::new(FlakyStore {
            inner: MemoryTrendStore::new(),
            reject_player: None,
            available_inserts: Some(1),
            inserts: AtomicUsize::new(0),
        });
        let coordinator = coordinator(store.clone());
        let batch = snapshot(
            vec![row("Josh Allen", "95.5%", "vs MIA"), row("Jalen Hurts", "97.0%", "@ DAL")],
            Some("Week 5"),
        );

        let result = coordinator.run_batch_at(&batch, batch_time()).await;
        assert!(matches!(result, Err(TrackerError::StoreUnavailable(_))));
        assert_eq!(store.inner.len().await, 1);
    }

    /// Store double whose lookups fail for one player
    struct FailingLookupStore {
        inner: MemoryTrendStore,
        player: String,
        error: StoreError,
    }

    #[async_trait]
    impl TrendStore for FailingLookupStore {
        async fn query_latest(
            &self,
            player_name: &str,
            week: u32,
        ) -> StoreResult<Option<PlayerTrendRecord>> {
            if player_name == self.player {
                return Err(self.error.clone());
            }
            self.inner.query_latest(player_name, week).await
        }

        async fn insert(&self, record: &PlayerTrendRecord) -> StoreResult<()> {
            self.inner.insert(record).await
        }
    }

    fn three_players() -> PageSnapshot {
        snapshot(
            vec![
                row("Josh Allen", "95.5%", "vs MIA"),
                row("Cooper Kupp", "89.4%", "vs LAR"),
                row("Jalen Hurts", "97.0%", "@ DAL"),
            ],
            Some("Week 5"),
        )
    }

    #[tokio::test]
    async fn test_lookup_failure_is_isolated() {
        let store = Arc::new(FailingLookupStore {
            inner: MemoryTrendStore::new(),
            player: "Cooper Kupp".to_string(),
            error: StoreError::Query("statement timeout".to_string()),
        });
        let coordinator = coordinator(store.clone());

        let summary = coordinator.run_batch_at(&three_players(), batch_time()).await.unwrap();
        assert_eq!((summary.inserted, summary.skipped, summary.failed), (2, 0, 1));
        assert_eq!(summary.failures[0].index, 1);
        assert_eq!(summary.failures[0].player.as_deref(), Some("Cooper Kupp"));
        assert!(summary.failures[0].reason.starts_with("Query failed for player Cooper Kupp"));
        assert_eq!(store.inner.len().await, 2);
    }

    #[tokio::test]
    async fn test_lookup_outage_aborts_batch_without_rollback() {
        let store = Arc::new(FailingLookupStore {
            inner: MemoryTrendStore::new(),
            player: "Cooper Kupp".to_string(),
            error: StoreError::Unavailable("connection refused".to_string()),
        });
        let coordinator = coordinator(store.clone());

        let result = coordinator.run_batch_at(&three_players(), batch_time()).await;
        assert!(matches!(result, Err(TrackerError::StoreUnavailable(_))));
        assert_eq!(store.inner.len().await, 1);
        assert!(store.inner.query_latest("Jalen Hurts", 5).await.unwrap().is_none());
    }

    #[test]
    fn test_store_never_shrinks_across_runs() {
        let store = Arc::new(MemoryTrendStore::new());
        let coordinator = coordinator(store.clone());
        let mut previous_len = 0;

        for (i, rostered) in ["95.5%", "95.5%", "95.7%", "", "95.7%"].iter().enumerate() {
            let batch = snapshot(vec![row("Josh Allen", rostered, "vs MIA")], Some("Week 5"));
            let at = batch_time() + Duration::minutes(30 * i as i64);
            tokio_test::block_on(coordinator.run_batch_at(&batch, at)).unwrap();

            let len = tokio_test::block_on(store.len());
            assert!(len >= previous_len);
            previous_len = len;
        }

        // baseline, +95.7, value disappeared, value reappeared
        assert_eq!(previous_len, 4);
    }

    #[test]
    fn test_summary_display() {
        let mut summary = BatchSummary::new(
            ResolvedWeek { week: 5, source: WeekSource::Page },
            batch_time(),
        );
        summary.inserted = 3;
        summary.baselines = 1;
        summary.updated = 2;
        summary.skipped = 10;

        assert_eq!(
            summary.to_string(),
            "week 5 (page): inserted 3 (1 new, 2 updated), skipped 10, failed 0"
        );
    }
}
