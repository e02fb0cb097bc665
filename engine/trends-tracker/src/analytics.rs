//! # Trend Analytics
//!
//! Read-only reports over stored trend history: trending players, per-week
//! statistics, single-player history, team breakdowns, a daily activity
//! summary and a duplicate audit.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::Result;
use crate::store::TrendHistory;
use crate::types::PlayerTrendRecord;

/// Default threshold, in percentage points, for the trending report
pub const DEFAULT_MIN_CHANGE: f64 = 5.0;

/// Most recent records considered by the daily summary
pub const DAILY_WINDOW: usize = 50;

/// Rostered percentage at or above which a player counts as high-owned
pub const HIGH_OWNED_ROSTERED: f64 = 80.0;

const TOP_PLAYERS: usize = 5;

/// Players whose ownership moved by at least `min_change`
#[derive(Debug, Clone, Serialize)]
pub struct TrendingReport {
    pub min_change: f64,
    pub total_trending: usize,
    pub rising: usize,
    pub falling: usize,
    pub by_position: BTreeMap<String, usize>,
    pub top_rising: Vec<PlayerTrendRecord>,
    pub top_falling: Vec<PlayerTrendRecord>,
    pub generated_at: DateTime<Utc>,
}

/// Activity recorded for one week
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekStats {
    pub week: u32,
    pub records: usize,
    pub unique_players: usize,
    /// Distinct batch timestamps
    pub sessions: usize,
    pub first_scraped: DateTime<Utc>,
    pub last_scraped: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeekOverview {
    pub total_records: usize,
    /// Week of the most recently scraped record
    pub current_week: Option<u32>,
    pub weeks: Vec<WeekStats>,
}

/// Latest stats and recent movement for one player
#[derive(Debug, Clone, Serialize)]
pub struct PlayerReport {
    pub latest: PlayerTrendRecord,
    pub total_records: usize,
    pub rostered_trend: Option<f64>,
    pub started_trend: Option<f64>,
    /// Oldest first
    pub history: Vec<PlayerTrendRecord>,
}

/// Latest state of every stored player on one team
#[derive(Debug, Clone, Serialize)]
pub struct TeamReport {
    pub team: String,
    pub total_players: usize,
    pub by_position: BTreeMap<String, usize>,
    /// Mean over players with a value; `None` when no player has one
    pub avg_rostered: Option<f64>,
    pub avg_started: Option<f64>,
    pub most_rostered: Vec<PlayerTrendRecord>,
    pub most_started: Vec<PlayerTrendRecord>,
    pub generated_at: DateTime<Utc>,
}

/// Activity across the most recently scraped players
#[derive(Debug, Clone, Serialize)]
pub struct DailySummary {
    pub total_players: usize,
    pub by_position: BTreeMap<String, usize>,
    pub total_adds: f64,
    pub total_drops: f64,
    pub net_adds: f64,
    pub high_owned: usize,
    pub trending_up: usize,
    pub trending_down: usize,
    pub top_trending_up: Vec<PlayerTrendRecord>,
    pub top_trending_down: Vec<PlayerTrendRecord>,
    pub most_added: Vec<PlayerTrendRecord>,
    pub most_dropped: Vec<PlayerTrendRecord>,
    pub generated_at: DateTime<Utc>,
}

/// A run of consecutive identical versions for one player and week
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    pub player_name: String,
    pub week: u32,
    pub signature: String,
    pub count: usize,
    pub first_scraped: DateTime<Utc>,
    pub last_scraped: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateAudit {
    pub total_records: usize,
    /// Rows that could be removed while keeping one per run
    pub redundant_rows: usize,
    pub groups: Vec<DuplicateGroup>,
}

/// Build the trending report over the latest record of every player
pub async fn trending_report<H>(history: &H, min_change: f64) -> Result<TrendingReport>
where
    H: TrendHistory + ?Sized,
{
    let records = history.all_records().await?;
    Ok(build_trending_report(latest_per_player(records), min_change, Utc::now()))
}

fn build_trending_report(
    latest: Vec<PlayerTrendRecord>,
    min_change: f64,
    generated_at: DateTime<Utc>,
) -> TrendingReport {
    let moved = |value: Option<f64>| value.is_some_and(|v| v.abs() >= min_change);

    let trending: Vec<PlayerTrendRecord> = latest
        .into_iter()
        .filter(|r| moved(r.percent_rostered_change) || moved(r.percent_started_change))
        .collect();

    let by_position = count_by_position(&trending);
    let rostered_change = |r: &PlayerTrendRecord| r.percent_rostered_change.unwrap_or(0.0);

    let top_rising: Vec<PlayerTrendRecord> =
        trending.iter().filter(|r| rostered_change(r) >= min_change).cloned().collect();
    let top_falling: Vec<PlayerTrendRecord> =
        trending.iter().filter(|r| rostered_change(r) <= -min_change).cloned().collect();
    let rising = top_rising.len();
    let falling = top_falling.len();

    TrendingReport {
        min_change,
        total_trending: trending.len(),
        rising,
        falling,
        by_position,
        top_rising: top_by(top_rising, |r| r.percent_rostered_change, true),
        top_falling: top_by(top_falling, |r| r.percent_rostered_change, false),
        generated_at,
    }
}

/// Per-week record, player and session counts
pub async fn week_stats<H>(history: &H) -> Result<WeekOverview>
where
    H: TrendHistory + ?Sized,
{
    let records = history.all_records().await?;
    Ok(build_week_overview(&records))
}

fn build_week_overview(records: &[PlayerTrendRecord]) -> WeekOverview {
    let mut by_week: BTreeMap<u32, Vec<&PlayerTrendRecord>> = BTreeMap::new();
    for record in records {
        by_week.entry(record.week).or_default().push(record);
    }

    let weeks = by_week
        .into_iter()
        .filter_map(|(week, rows)| {
            let first_scraped = rows.iter().map(|r| r.scraped_at).min()?;
            let last_scraped = rows.iter().map(|r| r.scraped_at).max()?;
            let unique_players: BTreeSet<&str> =
                rows.iter().map(|r| r.player_name.as_str()).collect();
            let sessions: BTreeSet<DateTime<Utc>> = rows.iter().map(|r| r.scraped_at).collect();

            Some(WeekStats {
                week,
                records: rows.len(),
                unique_players: unique_players.len(),
                sessions: sessions.len(),
                first_scraped,
                last_scraped,
            })
        })
        .collect();

    WeekOverview {
        total_records: records.len(),
        current_week: records.iter().max_by_key(|r| r.scraped_at).map(|r| r.week),
        weeks,
    }
}

/// History of the most recently scraped player matching `name` (case-insensitive, partial)
pub async fn player_report<H>(history: &H, name: &str) -> Result<Option<PlayerReport>>
where
    H: TrendHistory + ?Sized,
{
    let matches = history.player_history(name).await?;
    Ok(build_player_report(matches))
}

fn build_player_report(matches: Vec<PlayerTrendRecord>) -> Option<PlayerReport> {
    let player_name = matches.iter().max_by_key(|r| r.scraped_at)?.player_name.clone();

    let mut records: Vec<PlayerTrendRecord> =
        matches.into_iter().filter(|r| r.player_name == player_name).collect();
    records.sort_by_key(|r| r.scraped_at);

    let latest = records.last()?.clone();
    let (rostered_trend, started_trend) = match records.len() {
        1 => (latest.percent_rostered_change, latest.percent_started_change),
        n => {
            let previous = &records[n - 2];
            (
                difference(latest.percent_rostered, previous.percent_rostered),
                difference(latest.percent_started, previous.percent_started),
            )
        }
    };

    Some(PlayerReport {
        latest,
        total_records: records.len(),
        rostered_trend,
        started_trend,
        history: records,
    })
}

fn difference(latest: Option<f64>, previous: Option<f64>) -> Option<f64> {
    Some(latest? - previous?)
}

/// Breakdown of a team's players, using each player's latest record
pub async fn team_report<H>(history: &H, team: &str) -> Result<Option<TeamReport>>
where
    H: TrendHistory + ?Sized,
{
    let records = history.all_records().await?;
    Ok(build_team_report(latest_per_player(records), team, Utc::now()))
}

fn build_team_report(
    latest: Vec<PlayerTrendRecord>,
    team: &str,
    generated_at: DateTime<Utc>,
) -> Option<TeamReport> {
    let team = team.trim().to_ascii_uppercase();
    let players: Vec<PlayerTrendRecord> =
        latest.into_iter().filter(|r| r.team.eq_ignore_ascii_case(&team)).collect();
    if players.is_empty() {
        return None;
    }

    Some(TeamReport {
        total_players: players.len(),
        by_position: count_by_position(&players),
        avg_rostered: mean(players.iter().filter_map(|r| r.percent_rostered)),
        avg_started: mean(players.iter().filter_map(|r| r.percent_started)),
        most_rostered: top_by(players.clone(), |r| r.percent_rostered, true),
        most_started: top_by(players, |r| r.percent_started, true),
        team,
        generated_at,
    })
}

/// Adds, drops and ownership movement over the latest `DAILY_WINDOW` records
pub async fn daily_summary<H>(history: &H) -> Result<Option<DailySummary>>
where
    H: TrendHistory + ?Sized,
{
    let records = history.latest_records(DAILY_WINDOW).await?;
    Ok(build_daily_summary(latest_per_player(records), Utc::now()))
}

fn build_daily_summary(
    players: Vec<PlayerTrendRecord>,
    generated_at: DateTime<Utc>,
) -> Option<DailySummary> {
    if players.is_empty() {
        return None;
    }

    let total_adds: f64 = players.iter().filter_map(|r| r.adds).sum();
    let total_drops: f64 = players.iter().filter_map(|r| r.drops).sum();
    let rostered_change = |r: &PlayerTrendRecord| r.percent_rostered_change.unwrap_or(0.0);

    let trending_up: Vec<PlayerTrendRecord> =
        players.iter().filter(|r| rostered_change(r) >= DEFAULT_MIN_CHANGE).cloned().collect();
    let trending_down: Vec<PlayerTrendRecord> =
        players.iter().filter(|r| rostered_change(r) <= -DEFAULT_MIN_CHANGE).cloned().collect();

    Some(DailySummary {
        total_players: players.len(),
        by_position: count_by_position(&players),
        total_adds,
        total_drops,
        net_adds: total_adds - total_drops,
        high_owned: players
            .iter()
            .filter(|r| r.percent_rostered.is_some_and(|v| v >= HIGH_OWNED_ROSTERED))
            .count(),
        trending_up: trending_up.len(),
        trending_down: trending_down.len(),
        top_trending_up: top_by(trending_up, |r| r.percent_rostered_change, true),
        top_trending_down: top_by(trending_down, |r| r.percent_rostered_change, false),
        most_added: top_by(players.clone(), |r| r.adds, true),
        most_dropped: top_by(players, |r| r.drops, true),
        generated_at,
    })
}

/// Find consecutive identical versions of a player within a week
pub async fn duplicate_audit<H>(history: &H) -> Result<DuplicateAudit>
where
    H: TrendHistory + ?Sized,
{
    let records = history.all_records().await?;
    Ok(build_duplicate_audit(&records))
}

fn build_duplicate_audit(records: &[PlayerTrendRecord]) -> DuplicateAudit {
    let mut by_key: BTreeMap<(&str, u32), Vec<&PlayerTrendRecord>> = BTreeMap::new();
    for record in records {
        by_key.entry((record.player_name.as_str(), record.week)).or_default().push(record);
    }

    let mut groups = Vec::new();
    for ((player_name, week), mut rows) in by_key {
        rows.sort_by_key(|r| r.scraped_at);

        let mut run: Vec<&PlayerTrendRecord> = Vec::new();
        let mut run_signature = String::new();
        for row in rows {
            let sig = signature(row);
            if !run.is_empty() && sig != run_signature {
                push_run(&mut groups, player_name, week, &run_signature, &run);
                run.clear();
            }
            run_signature = sig;
            run.push(row);
        }
        push_run(&mut groups, player_name, week, &run_signature, &run);
    }

    let redundant_rows = groups.iter().map(|g| g.count - 1).sum();
    DuplicateAudit { total_records: records.len(), redundant_rows, groups }
}

fn push_run(
    groups: &mut Vec<DuplicateGroup>,
    player_name: &str,
    week: u32,
    signature: &str,
    run: &[&PlayerTrendRecord],
) {
    if let [first, .., last] = run {
        groups.push(DuplicateGroup {
            player_name: player_name.to_string(),
            week,
            signature: signature.to_string(),
            count: run.len(),
            first_scraped: first.scraped_at,
            last_scraped: last.scraped_at,
        });
    }
}

/// Tracked values joined with `|`; missing values render empty.
/// `-0.0` renders as `0` since the detector treats the two as equal.
fn signature(record: &PlayerTrendRecord) -> String {
    let value = |v: Option<f64>| v.map(|v| (v + 0.0).to_string()).unwrap_or_default();
    format!(
        "{}|{}|{}|{}|{}",
        value(record.percent_rostered),
        value(record.percent_rostered_change),
        value(record.percent_started),
        value(record.percent_started_change),
        record.opponent
    )
}

fn count_by_position(records: &[PlayerTrendRecord]) -> BTreeMap<String, usize> {
    let mut by_position = BTreeMap::new();
    for record in records {
        let position =
            if record.position.is_empty() { "Unknown" } else { record.position.as_str() };
        *by_position.entry(position.to_string()).or_insert(0) += 1;
    }
    by_position
}

/// First `TOP_PLAYERS` records with a value for `key`, ordered by it
fn top_by<F>(records: Vec<PlayerTrendRecord>, key: F, descending: bool) -> Vec<PlayerTrendRecord>
where
    F: Fn(&PlayerTrendRecord) -> Option<f64>,
{
    let mut ranked: Vec<(f64, PlayerTrendRecord)> =
        records.into_iter().filter_map(|r| key(&r).map(|v| (v, r))).collect();
    ranked.sort_by(|(a, _), (b, _)| if descending { b.total_cmp(a) } else { a.total_cmp(b) });
    ranked.into_iter().take(TOP_PLAYERS).map(|(_, r)| r).collect()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Latest record per player name, by scrape time
fn latest_per_player(records: Vec<PlayerTrendRecord>) -> Vec<PlayerTrendRecord> {
    let mut latest: HashMap<String, PlayerTrendRecord> = HashMap::new();
    for record in records {
        let newer = latest
            .get(&record.player_name)
            .map_or(true, |existing| record.scraped_at >= existing.scraped_at);
        if newer {
            latest.insert(record.player_name.clone(), record);
        }
    }
    latest.into_values().collect()
}
