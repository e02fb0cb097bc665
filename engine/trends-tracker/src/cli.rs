//! # Command Line Interface
//!
//! Scrape, watch and report commands for the trends tracker.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::analytics::{self, DEFAULT_MIN_CHANGE};
use crate::config::TrackerConfig;
use crate::coordinator::{BatchSummary, UpsertCoordinator};
use crate::pg_store::PgTrendStore;
use crate::scheduler::TrendsScheduler;
use crate::scraper::TrendsPageScraper;
use crate::store::{MemoryTrendStore, TrendStore};
use crate::types::PlayerTrendRecord;
use crate::week::WeekResolver;

/// NFL fantasy trends tracker
#[derive(Parser)]
#[command(name = "trends-tracker")]
#[command(about = "Scrapes NFL.com fantasy trends and keeps a change-only history")]
pub struct Cli {
    /// Optional TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scrape once and store changed players
    Run {
        /// Use an in-memory store instead of the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Scrape on a fixed interval until interrupted
    Watch {
        /// Use an in-memory store instead of the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the week a batch would be assigned to
    Week {
        /// Page week text to resolve, e.g. "Week 7"
        #[arg(long)]
        indicator: Option<String>,
    },
    /// Read-only reports over stored history
    Report {
        /// Print JSON instead of text
        #[arg(long, global = true)]
        json: bool,

        #[command(subcommand)]
        report: ReportCommand,
    },
}

#[derive(Subcommand)]
pub enum ReportCommand {
    /// Players whose ownership moved significantly
    Trending {
        /// Minimum change in percentage points
        #[arg(long, default_value_t = DEFAULT_MIN_CHANGE)]
        min_change: f64,
    },
    /// Records, players and sessions per week
    Weeks,
    /// History of one player (partial, case-insensitive name)
    Player { name: String },
    /// Latest state of every player on a team, e.g. KC
    Team { team: String },
    /// Adds, drops and ownership movement across the most recent records
    Daily,
    /// Consecutive identical versions left in the table
    Duplicates,
}

/// CLI handler
pub struct CliHandler {
    config: TrackerConfig,
}

impl CliHandler {
    /// Create new CLI handler
    pub fn new(config: TrackerConfig) -> Self {
        Self { config }
    }

    /// Handle CLI commands
    pub async fn handle_command(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Run { dry_run } => {
                let summary = self.scheduler(dry_run).await?.run_once().await?;
                print_summary(&summary);
            }
            Commands::Watch { dry_run } => {
                self.scheduler(dry_run).await?.start().await?;
            }
            Commands::Week { indicator } => {
                self.show_week(indicator.as_deref());
            }
            Commands::Report { json, report } => {
                self.show_report(report, json).await?;
            }
        }
        Ok(())
    }

    async fn scheduler(&self, dry_run: bool) -> Result<TrendsScheduler> {
        let store: Arc<dyn TrendStore> = if dry_run {
            println!("Dry run: changes are kept in memory only");
            Arc::new(MemoryTrendStore::new())
        } else {
            Arc::new(self.connect().await?)
        };

        let source = TrendsPageScraper::new(self.config.scraper.clone())
            .context("Failed to build HTTP client")?;
        let coordinator = UpsertCoordinator::new(
            store,
            WeekResolver::new(self.config.week.clone()),
            self.config.detection.clone(),
        );

        Ok(TrendsScheduler::new(
            self.config.scheduler.clone(),
            Arc::new(source),
            Arc::new(coordinator),
        ))
    }

    async fn connect(&self) -> Result<PgTrendStore> {
        PgTrendStore::connect(&self.config.database)
            .await
            .context("Failed to connect to trends database")
    }

    fn show_week(&self, indicator: Option<&str>) {
        let resolved = WeekResolver::new(self.config.week.clone()).resolve_now(indicator);
        println!("Week {} (source: {})", resolved.week, resolved.source);
    }

    async fn show_report(&self, report: ReportCommand, json: bool) -> Result<()> {
        let store = self.connect().await?;

        match report {
            ReportCommand::Trending { min_change } => {
                let report = analytics::trending_report(&store, min_change).await?;
                if json {
                    return print_json(&report);
                }

                println!("📈 Trending Players (min change {:.1}%)", report.min_change);
                println!("{}", "=".repeat(50));
                println!(
                    "Trending: {}  Rising: {}  Falling: {}",
                    report.total_trending, report.rising, report.falling
                );
                for (position, count) in &report.by_position {
                    println!("  {:<8} {}", position, count);
                }
                println!("\nTop rising:");
                report.top_rising.iter().for_each(print_player_line);
                println!("\nTop falling:");
                report.top_falling.iter().for_each(print_player_line);
            }
            ReportCommand::Weeks => {
                let overview = analytics::week_stats(&store).await?;
                if json {
                    return print_json(&overview);
                }

                println!("📅 Weekly Activity");
                println!("{}", "=".repeat(50));
                match overview.current_week {
                    Some(week) => println!("Current week: {}", week),
                    None => println!("No records stored yet"),
                }
                println!("Total records: {}", overview.total_records);
                for stats in &overview.weeks {
                    println!(
                        "  Week {:>2}: {:>6} records, {:>4} players, {:>3} sessions ({} .. {})",
                        stats.week,
                        stats.records,
                        stats.unique_players,
                        stats.sessions,
                        stats.first_scraped.format("%Y-%m-%d %H:%M"),
                        stats.last_scraped.format("%Y-%m-%d %H:%M")
                    );
                }
            }
            ReportCommand::Player { name } => {
                let Some(report) = analytics::player_report(&store, &name).await? else {
                    println!("No history found for {}", name);
                    return Ok(());
                };
                if json {
                    return print_json(&report);
                }

                let latest = &report.latest;
                println!("👤 {} ({} - {})", latest.player_name, latest.position, latest.team);
                println!("{}", "=".repeat(50));
                println!("Records: {}", report.total_records);
                println!("Rostered: {}", format_pct(latest.percent_rostered));
                println!("Started:  {}", format_pct(latest.percent_started));
                println!("Rostered trend: {}", format_pct(report.rostered_trend));
                println!("Started trend:  {}", format_pct(report.started_trend));
                println!("\nHistory:");
                report.history.iter().for_each(print_player_line);
            }
            ReportCommand::Team { team } => {
                let Some(report) = analytics::team_report(&store, &team).await? else {
                    println!("No players found for team {}", team.to_uppercase());
                    return Ok(());
                };
                if json {
                    return print_json(&report);
                }

                println!("🏈 Team {} ({} players)", report.team, report.total_players);
                println!("{}", "=".repeat(50));
                for (position, count) in &report.by_position {
                    println!("  {:<8} {}", position, count);
                }
                println!("Average rostered: {}", format_pct(report.avg_rostered));
                println!("Average started:  {}", format_pct(report.avg_started));
                println!("\nMost rostered:");
                report.most_rostered.iter().for_each(print_player_line);
                println!("\nMost started:");
                report.most_started.iter().for_each(print_player_line);
            }
            ReportCommand::Daily => {
                let Some(summary) = analytics::daily_summary(&store).await? else {
                    println!("No recent records available");
                    return Ok(());
                };
                if json {
                    return print_json(&summary);
                }

                println!("📊 Daily Summary ({} players)", summary.total_players);
                println!("{}", "=".repeat(50));
                for (position, count) in &summary.by_position {
                    println!("  {:<8} {}", position, count);
                }
                println!(
                    "Adds: {:.0}  Drops: {:.0}  Net: {:+.0}",
                    summary.total_adds, summary.total_drops, summary.net_adds
                );
                println!(
                    "High-owned: {}  Trending up: {}  Trending down: {}",
                    summary.high_owned, summary.trending_up, summary.trending_down
                );
                println!("\nTop trending up:");
                summary.top_trending_up.iter().for_each(print_player_line);
                println!("\nTop trending down:");
                summary.top_trending_down.iter().for_each(print_player_line);
                println!("\nMost added:");
                summary.most_added.iter().for_each(print_player_line);
                println!("\nMost dropped:");
                summary.most_dropped.iter().for_each(print_player_line);
            }
            ReportCommand::Duplicates => {
                let audit = analytics::duplicate_audit(&store).await?;
                if json {
                    return print_json(&audit);
                }

                println!("🔍 Duplicate Audit");
                println!("{}", "=".repeat(50));
                println!(
                    "{} redundant rows in {} runs ({} records total)",
                    audit.redundant_rows,
                    audit.groups.len(),
                    audit.total_records
                );
                for group in &audit.groups {
                    println!(
                        "  {} week {}: {} copies {} .. {}",
                        group.player_name,
                        group.week,
                        group.count,
                        group.first_scraped.format("%Y-%m-%d %H:%M"),
                        group.last_scraped.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }

        Ok(())
    }
}

fn print_summary(summary: &BatchSummary) {
    println!("✅ Scrape completed at {}", summary.scraped_at.format("%Y-%m-%d %H:%M:%S"));
    println!("{}", "=".repeat(50));
    println!("Week:      {} ({})", summary.week.week, summary.week.source);
    println!("Processed: {}", summary.processed);
    println!(
        "Inserted:  {} ({} new, {} updated)",
        summary.inserted, summary.baselines, summary.updated
    );
    println!("Skipped:   {}", summary.skipped);
    println!("Failed:    {}", summary.failed);
    for failure in &summary.failures {
        match &failure.player {
            Some(player) => println!("  row {} ({}): {}", failure.index, player, failure.reason),
            None => println!("  row {}: {}", failure.index, failure.reason),
        }
    }
}

fn print_player_line(record: &PlayerTrendRecord) {
    println!(
        "  {:<24} {:<3} {:<4} rostered {:>7} ({:>6})  started {:>7} ({:>6})  {}",
        record.player_name,
        record.position,
        record.team,
        format_pct(record.percent_rostered),
        format_pct(record.percent_rostered_change),
        format_pct(record.percent_started),
        format_pct(record.percent_started_change),
        record.scraped_at.format("%Y-%m-%d %H:%M")
    );
}

fn format_pct(value: Option<f64>) -> String {
    value.map(|v| format!("{:.1}", v)).unwrap_or_else(|| "-".to_string())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
