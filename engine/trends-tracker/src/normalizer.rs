//! Row normalization: raw scraped cells into typed trend records

use chrono::{DateTime, Utc};

use crate::error::{Result, TrackerError};
use crate::types::{columns, PlayerTrendRecord, RawRow};

/// Parse a scraped numeric cell.
///
/// Strips `%`, `+`, thousands separators and whitespace. Empty, unparsable or
/// non-finite input is `None` so that "no value" never reads as `0.0`.
pub fn parse_metric(value: &str) -> Option<f64> {
    let cleaned: String =
        value.chars().filter(|c| !matches!(c, '%' | '+' | ',') && !c.is_whitespace()).collect();

    if cleaned.is_empty() {
        return None;
    }

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Convert one raw row into a typed record.
///
/// `index` is the row's position in the batch and only used for error reporting.
pub fn normalize(
    raw: &RawRow,
    index: usize,
    week: u32,
    scraped_at: DateTime<Utc>,
) -> Result<PlayerTrendRecord> {
    let player_name = text(raw, columns::PLAYER_NAME);
    if player_name.is_empty() {
        return Err(TrackerError::malformed_row(index, "missing player name"));
    }

    let mut position = text(raw, columns::POSITION);
    let mut team = text(raw, columns::TEAM);
    if position.is_empty() && team.is_empty() {
        if let Some((pos, tm)) = raw.get(columns::POSITION_TEAM).and_then(split_position_team) {
            position = pos;
            team = tm;
        }
    }

    let player_id = Some(text(raw, columns::PLAYER_ID)).filter(|id| !id.is_empty());
    let metric = |column: &str| raw.get(column).and_then(parse_metric);

    Ok(PlayerTrendRecord {
        player_name,
        player_id,
        position,
        team,
        opponent: text(raw, columns::OPPONENT),
        percent_rostered: metric(columns::PERCENT_ROSTERED),
        percent_rostered_change: metric(columns::PERCENT_ROSTERED_CHANGE),
        percent_started: metric(columns::PERCENT_STARTED),
        percent_started_change: metric(columns::PERCENT_STARTED_CHANGE),
        adds: metric(columns::ADDS),
        drops: metric(columns::DROPS),
        week,
        scraped_at,
    })
}

/// Split "QB - BUF" into ("QB", "BUF")
pub fn split_position_team(text: &str) -> Option<(String, String)> {
    let (position, team) = text.split_once('-')?;
    let position = position.trim();
    let team = team.trim();

    if position.is_empty() || team.is_empty() {
        return None;
    }

    Some((position.to_string(), team.to_string()))
}

fn text(raw: &RawRow, column: &str) -> String {
    raw.get(column).map(str::trim).unwrap_or_default().to_string()
}
