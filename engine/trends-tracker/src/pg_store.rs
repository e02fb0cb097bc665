//! PostgreSQL trend store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::{Result, TrackerError};
use crate::store::{StoreResult, TrendHistory, TrendStore};
use crate::types::PlayerTrendRecord;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const RECORD_COLUMNS: &str = "player_name, player_id, position, team, opponent, \
     percent_rostered, percent_rostered_change, percent_started, percent_started_change, \
     adds, drops, week, scraped_at";

/// Trend store backed by the `nfl_fantasy_trends` table
pub struct PgTrendStore {
    pool: PgPool,
}

impl PgTrendStore {
    /// Connect to the database and apply migrations when configured
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| TrackerError::StoreUnavailable(e.to_string()))?;

        if config.run_migrations {
            MIGRATOR.run(&pool).await?;
            info!("Database migrations applied");
        }

        Ok(Self { pool })
    }
}

#[async_trait]
impl TrendStore for PgTrendStore {
    async fn query_latest(
        &self,
        player_name: &str,
        week: u32,
    ) -> StoreResult<Option<PlayerTrendRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM nfl_fantasy_trends \
             WHERE player_name = $1 AND week = $2 \
             ORDER BY scraped_at DESC, id DESC LIMIT 1"
        );

        let row = sqlx::query(&sql)
            .bind(player_name)
            .bind(week as i32)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| record_from_row(&row)).transpose()?)
    }

    async fn insert(&self, record: &PlayerTrendRecord) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO nfl_fantasy_trends ({RECORD_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        );

        sqlx::query(&sql)
            .bind(&record.player_name)
            .bind(&record.player_id)
            .bind(&record.position)
            .bind(&record.team)
            .bind(&record.opponent)
            .bind(record.percent_rostered)
            .bind(record.percent_rostered_change)
            .bind(record.percent_started)
            .bind(record.percent_started_change)
            .bind(record.adds)
            .bind(record.drops)
            .bind(record.week as i32)
            .bind(record.scraped_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl TrendHistory for PgTrendStore {
    async fn player_history(&self, player_name: &str) -> StoreResult<Vec<PlayerTrendRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM nfl_fantasy_trends \
             WHERE player_name ILIKE $1 ORDER BY scraped_at ASC, id ASC"
        );

        let rows = sqlx::query(&sql)
            .bind(format!("%{player_name}%"))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(record_from_row).collect::<std::result::Result<_, _>>()?)
    }

    async fn latest_records(&self, limit: usize) -> StoreResult<Vec<PlayerTrendRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM nfl_fantasy_trends \
             ORDER BY scraped_at DESC, id DESC LIMIT $1"
        );

        let rows = sqlx::query(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(record_from_row).collect::<std::result::Result<_, _>>()?)
    }

    async fn all_records(&self) -> StoreResult<Vec<PlayerTrendRecord>> {
        let sql =
            format!("SELECT {RECORD_COLUMNS} FROM nfl_fantasy_trends ORDER BY scraped_at ASC, id ASC");

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        Ok(rows.iter().map(record_from_row).collect::<std::result::Result<_, _>>()?)
    }
}

fn record_from_row(row: &PgRow) -> std::result::Result<PlayerTrendRecord, sqlx::Error> {
    let week: i32 = row.try_get("week")?;
    let week = u32::try_from(week).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    let scraped_at: DateTime<Utc> = row.try_get("scraped_at")?;

    Ok(PlayerTrendRecord {
        player_name: row.try_get("player_name")?,
        player_id: row.try_get("player_id")?,
        position: row.try_get("position")?,
        team: row.try_get("team")?,
        opponent: row.try_get("opponent")?,
        percent_rostered: row.try_get("percent_rostered")?,
        percent_rostered_change: row.try_get("percent_rostered_change")?,
        percent_started: row.try_get("percent_started")?,
        percent_started_change: row.try_get("percent_started_change")?,
        adds: row.try_get("adds")?,
        drops: row.try_get("drops")?,
        week,
        scraped_at,
    })
}
