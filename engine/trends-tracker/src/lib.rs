//! NFL Fantasy Trends Tracker
//!
//! Scrapes the NFL.com fantasy trends table and keeps an append-only history of
//! player ownership. Each scrape is assigned one NFL week; a player's row is
//! stored only when it differs from the latest stored version for that week.

pub mod analytics;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod detector;
pub mod error;
pub mod logging;
pub mod normalizer;
pub mod pg_store;
pub mod scheduler;
pub mod scraper;
pub mod store;
pub mod types;
pub mod week;

pub use config::TrackerConfig;
pub use coordinator::{BatchSummary, UpsertCoordinator};
pub use detector::{decide, ChangeDecision};
pub use error::{Result, TrackerError};
pub use pg_store::PgTrendStore;
pub use scheduler::TrendsScheduler;
pub use scraper::{PageSource, TrendsPageScraper};
pub use store::{MemoryTrendStore, TrendHistory, TrendStore};
pub use types::*;
pub use week::{ResolvedWeek, WeekResolver, WeekSource};
