//! NFL week resolution
//!
//! The week for a scrape batch comes from the page when it shows one, and from
//! the calendar otherwise. Resolution never fails: the worst case is the
//! configured default week, logged as a degraded condition.

use chrono::{Datelike, NaiveDate, Utc, Weekday};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use crate::config::WeekConfig;

/// First regular-season week
pub const MIN_WEEK: u32 = 1;

/// Last regular-season week
pub const MAX_WEEK: u32 = 18;

/// Where a resolved week came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WeekSource {
    /// Parsed from the page's week indicator
    Page,
    /// Derived from the current date and the season start
    Calendar,
    /// Neither signal was usable
    Default,
}

impl fmt::Display for WeekSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeekSource::Page => f.write_str("page"),
            WeekSource::Calendar => f.write_str("calendar"),
            WeekSource::Default => f.write_str("default"),
        }
    }
}

/// The week shared by every row of one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedWeek {
    pub week: u32,
    pub source: WeekSource,
}

/// Resolves the NFL week for a scrape batch
#[derive(Debug, Clone)]
pub struct WeekResolver {
    config: WeekConfig,
    kickoff: fn(i32) -> Option<NaiveDate>,
}

impl WeekResolver {
    /// Create a new resolver using the first Thursday of September as kickoff
    pub fn new(config: WeekConfig) -> Self {
        Self { config, kickoff: first_thursday_of_september }
    }

    /// Replace the rule that yields a year's kickoff date when no season start
    /// is configured. A rule returning `None` sends resolution to the
    /// configured fallback week.
    pub fn with_kickoff_rule(mut self, kickoff: fn(i32) -> Option<NaiveDate>) -> Self {
        self.kickoff = kickoff;
        self
    }

    /// Resolve using today's UTC date
    pub fn resolve_now(&self, indicator: Option<&str>) -> ResolvedWeek {
        self.resolve(indicator, Utc::now().date_naive())
    }

    /// Resolve the week from the page indicator, falling back to the calendar
    pub fn resolve(&self, indicator: Option<&str>, today: NaiveDate) -> ResolvedWeek {
        match indicator {
            Some(text) => match parse_week_indicator(text) {
                Some(week) => {
                    info!(week, "NFL week detected from page");
                    return ResolvedWeek { week, source: WeekSource::Page };
                }
                None => {
                    warn!(indicator = %text, "Week resolution degraded: unparsable page indicator");
                }
            },
            None => debug!("No week indicator on page, using calendar"),
        }

        match self.season_start(today.year()) {
            Some(start) => {
                let week = week_for_date(start, today);
                info!(week, season_start = %start, "NFL week calculated from date");
                ResolvedWeek { week, source: WeekSource::Calendar }
            }
            None => {
                warn!(
                    week = self.config.fallback_week,
                    "Week resolution degraded: no season start available, using default week"
                );
                ResolvedWeek { week: self.config.fallback_week, source: WeekSource::Default }
            }
        }
    }

    /// Season start for the given year: configured, or the kickoff rule's date.
    /// With the default rule this is only `None` for years outside chrono's range.
    pub fn season_start(&self, year: i32) -> Option<NaiveDate> {
        self.config.season_start.or_else(|| (self.kickoff)(year))
    }
}

/// Extract a week number from page text such as "Week 7" or "WEEK 12 Trends".
///
/// Returns `None` unless the number lies in `[MIN_WEEK, MAX_WEEK]`.
pub fn parse_week_indicator(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    if let Ok(week) = trimmed.parse::<u32>() {
        return in_range(week);
    }

    let lower = trimmed.to_ascii_lowercase();
    let mut rest = lower.as_str();

    while let Some(pos) = rest.find("week") {
        rest = &rest[pos + "week".len()..];
        let digits: String =
            rest.trim_start().chars().take_while(|c| c.is_ascii_digit()).collect();

        if let Some(week) = digits.parse::<u32>().ok().and_then(in_range) {
            return Some(week);
        }
    }

    None
}

/// Week number for `today`, counting 7-day blocks from `season_start`.
///
/// Dates before the season start map to week 1; late dates saturate at week 18.
pub fn week_for_date(season_start: NaiveDate, today: NaiveDate) -> u32 {
    let elapsed_days = (today - season_start).num_days();
    if elapsed_days < 0 {
        return MIN_WEEK;
    }

    let week = (elapsed_days / 7 + 1).min(MAX_WEEK as i64);
    week as u32
}

/// The NFL kickoff is the first Thursday of September
pub fn first_thursday_of_september(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, 9, Weekday::Thu, 1)
}

fn in_range(week: u32) -> Option<u32> {
    (MIN_WEEK..=MAX_WEEK).contains(&week).then_some(week)
}
