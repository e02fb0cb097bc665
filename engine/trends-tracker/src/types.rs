use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Canonical column labels used by raw scraped rows
pub mod columns {
    pub const PLAYER_NAME: &str = "player_name";
    pub const PLAYER_ID: &str = "player_id";
    pub const POSITION: &str = "position";
    pub const TEAM: &str = "team";
    /// Combined "QB - BUF" text, used when position/team are not split out
    pub const POSITION_TEAM: &str = "position_team";
    pub const OPPONENT: &str = "opponent";
    pub const PERCENT_ROSTERED: &str = "percent_rostered";
    pub const PERCENT_ROSTERED_CHANGE: &str = "percent_rostered_change";
    pub const PERCENT_STARTED: &str = "percent_started";
    pub const PERCENT_STARTED_CHANGE: &str = "percent_started_change";
    pub const ADDS: &str = "adds";
    pub const DROPS: &str = "drops";
}

/// One row of the trends table as scraped, before validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    /// Column label to cell text
    pub cells: HashMap<String, String>,
}

impl RawRow {
    /// Create an empty raw row
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of a single cell
    pub fn with(mut self, column: &str, value: impl Into<String>) -> Self {
        self.cells.insert(column.to_string(), value.into());
        self
    }

    /// Set a cell value
    pub fn set(&mut self, column: &str, value: impl Into<String>) {
        self.cells.insert(column.to_string(), value.into());
    }

    /// Get a cell value, if present
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }
}

/// Everything the page-fetch collaborator hands to the core for one cycle
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    /// Rows in page order
    pub rows: Vec<RawRow>,
    /// Week text observed on the page (e.g. "Week 7"), if any
    pub week_indicator: Option<String>,
}

/// A player's fantasy ownership snapshot at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerTrendRecord {
    /// Player name (e.g., "Josh Allen"); identity key together with week
    pub player_name: String,
    /// NFL.com player ID, when the player link carries one
    pub player_id: Option<String>,
    /// Position (QB, RB, WR, TE, K, DEF)
    pub position: String,
    /// Team abbreviation (e.g., "BUF")
    pub team: String,
    /// Matchup descriptor (e.g., "vs LAR", "@ SEA")
    pub opponent: String,
    pub percent_rostered: Option<f64>,
    pub percent_rostered_change: Option<f64>,
    pub percent_started: Option<f64>,
    pub percent_started_change: Option<f64>,
    pub adds: Option<f64>,
    pub drops: Option<f64>,
    /// NFL week the record pertains to (1-18)
    pub week: u32,
    /// When the batch containing this record was scraped
    pub scraped_at: DateTime<Utc>,
}

impl PlayerTrendRecord {
    /// Create a record with only identity fields set; all metrics missing
    pub fn new(player_name: impl Into<String>, week: u32, scraped_at: DateTime<Utc>) -> Self {
        Self {
            player_name: player_name.into(),
            player_id: None,
            position: String::new(),
            team: String::new(),
            opponent: String::new(),
            percent_rostered: None,
            percent_rostered_change: None,
            percent_started: None,
            percent_started_change: None,
            adds: None,
            drops: None,
            week,
            scraped_at,
        }
    }

    /// Read a monitored numeric field
    pub fn metric(&self, field: TrackedField) -> Option<f64> {
        match field {
            TrackedField::PercentRostered => self.percent_rostered,
            TrackedField::PercentRosteredChange => self.percent_rostered_change,
            TrackedField::PercentStarted => self.percent_started,
            TrackedField::PercentStartedChange => self.percent_started_change,
            TrackedField::Opponent => None,
        }
    }
}

/// Fields the change detector monitors, in comparison order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrackedField {
    PercentRostered,
    PercentRosteredChange,
    PercentStarted,
    PercentStartedChange,
    Opponent,
}

impl TrackedField {
    /// Numeric fields, compared with zero tolerance
    pub const NUMERIC: [TrackedField; 4] = [
        TrackedField::PercentRostered,
        TrackedField::PercentRosteredChange,
        TrackedField::PercentStarted,
        TrackedField::PercentStartedChange,
    ];

    /// Column / storage name of the field
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackedField::PercentRostered => columns::PERCENT_ROSTERED,
            TrackedField::PercentRosteredChange => columns::PERCENT_ROSTERED_CHANGE,
            TrackedField::PercentStarted => columns::PERCENT_STARTED,
            TrackedField::PercentStartedChange => columns::PERCENT_STARTED_CHANGE,
            TrackedField::Opponent => columns::OPPONENT,
        }
    }
}

impl fmt::Display for TrackedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
