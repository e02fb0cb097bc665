use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::config::SchedulerConfig;
use crate::coordinator::{BatchSummary, UpsertCoordinator};
use crate::error::Result;
use crate::scraper::PageSource;

/// Periodic scrape-and-upsert driver
pub struct TrendsScheduler {
    config: SchedulerConfig,
    source: Arc<dyn PageSource>,
    coordinator: Arc<UpsertCoordinator>,
}

impl TrendsScheduler {
    /// Create a new scheduler
    pub fn new(
        config: SchedulerConfig,
        source: Arc<dyn PageSource>,
        coordinator: Arc<UpsertCoordinator>,
    ) -> Self {
        Self { config, source, coordinator }
    }

    /// Scrape once and process the batch
    pub async fn run_once(&self) -> Result<BatchSummary> {
        let snapshot = self.source.fetch().await?;
        self.coordinator.run_batch(&snapshot).await
    }

    /// Run a cycle every `interval_minutes` until Ctrl-C
    pub async fn start(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run a cycle every `interval_minutes` until `shutdown` resolves.
    /// A failed cycle is logged and retried on the next tick.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let period = Duration::from_secs(self.config.interval_minutes * 60);
        info!("Starting trends scheduler, interval {:?}", period);

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping scheduler");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(summary) => info!("Scrape cycle completed: {}", summary),
                        Err(e) => error!("Scrape cycle failed, retrying next interval: {}", e),
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DetectionConfig, WeekConfig};
    use crate::error::TrackerError;
    use crate::store::MemoryTrendStore;
    use crate::types::{columns, PageSnapshot, RawRow};
    use crate::week::WeekResolver;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct FixedSource {
        fail: bool,
        fetches: AtomicUsize,
        fetched: Arc<Notify>,
    }

    #[async_trait]
    impl PageSource for FixedSource {
        async fn fetch(&self) -> Result<PageSnapshot> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.fetched.notify_one();
            if self.fail {
                return Err(TrackerError::Fetch("HTTP request failed with status: 503".into()));
            }
            Ok(PageSnapshot {
                rows: vec![RawRow::new()
                    .with(columns::PLAYER_NAME, "Bijan Robinson")
                    .with(columns::POSITION_TEAM, "RB - ATL")
                    .with(columns::PERCENT_ROSTERED, "99.1%")],
                week_indicator: Some("Week 7".into()),
            })
        }
    }

    fn scheduler(fail: bool) -> (TrendsScheduler, Arc<FixedSource>, Arc<MemoryTrendStore>) {
        let source = Arc::new(FixedSource {
            fail,
            fetches: AtomicUsize::new(0),
            fetched: Arc::new(Notify::new()),
        });
        let store = Arc::new(MemoryTrendStore::new());
        let coordinator = Arc::new(UpsertCoordinator::new(
            store.clone(),
            WeekResolver::new(WeekConfig::default()),
            DetectionConfig::default(),
        ));
        let scheduler = TrendsScheduler::new(SchedulerConfig::default(), source.clone(), coordinator);
        (scheduler, source, store)
    }

    #[tokio::test]
    async fn test_run_once() {
        let (scheduler, _, store) = scheduler(false);

        let summary = scheduler.run_once().await.unwrap();
        assert_eq!(summary.week.week, 7);
        assert_eq!(summary.inserted, 1);

        let summary = scheduler.run_once().await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_run_once_surfaces_fetch_error() {
        let (scheduler, _, store) = scheduler(true);
        assert!(matches!(scheduler.run_once().await, Err(TrackerError::Fetch(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_watch_survives_failed_cycle() {
        let (scheduler, source, _) = scheduler(true);
        let fetched = source.fetched.clone();

        // First tick fires immediately; stop once it has been attempted
        scheduler.run_until(async move { fetched.notified().await }).await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }
}
