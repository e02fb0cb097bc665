use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::error::{Result, TrackerError};
use crate::types::{columns, PageSnapshot, RawRow};
use crate::week::parse_week_indicator;

/// Stat columns of the trends table, by cell position
const STAT_COLUMNS: [(usize, &str); 6] = [
    (2, columns::PERCENT_ROSTERED),
    (3, columns::PERCENT_ROSTERED_CHANGE),
    (4, columns::PERCENT_STARTED),
    (5, columns::PERCENT_STARTED_CHANGE),
    (6, columns::ADDS),
    (7, columns::DROPS),
];

/// Elements that may carry the current week, most specific first
const WEEK_SELECTORS: [&str; 4] =
    ["[data-week]", "select[name*='week'] option[selected]", ".week-selector", "[class*='week']"];

/// Source of raw trend rows for one scrape cycle
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self) -> Result<PageSnapshot>;
}

/// NFL.com fantasy trends table scraper
pub struct TrendsPageScraper {
    client: Client,
    config: ScraperConfig,
}

impl TrendsPageScraper {
    /// Create a new trends scraper
    pub fn new(config: ScraperConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self { client, config })
    }

    /// URL of the page starting at `offset`
    pub fn page_url(&self, offset: u32) -> String {
        if offset == 0 {
            return self.config.base_url.clone();
        }
        let separator = if self.config.base_url.contains('?') { '&' } else { '?' };
        format!("{}{separator}offset={offset}", self.config.base_url)
    }

    async fn fetch_page(&self, offset: u32) -> Result<PageSnapshot> {
        let url = self.page_url(offset);
        info!("Fetching trends page: {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(TrackerError::Fetch(format!(
                "HTTP request failed with status: {}",
                response.status()
            )));
        }

        let html = response.text().await?;
        debug!("Fetched HTML ({} bytes)", html.len());

        parse_trends_page(&html)
    }
}

#[async_trait]
impl PageSource for TrendsPageScraper {
    async fn fetch(&self) -> Result<PageSnapshot> {
        let mut snapshot = PageSnapshot::default();
        let page_size = self.config.page_size as usize;

        for page in 0..self.config.max_pages {
            let offset = page * self.config.page_size;
            let page_data = self.fetch_page(offset).await?;

            if snapshot.week_indicator.is_none() {
                snapshot.week_indicator = page_data.week_indicator;
            }

            let row_count = page_data.rows.len();
            info!("Page {} yielded {} rows", page + 1, row_count);
            snapshot.rows.extend(page_data.rows);

            if row_count < page_size {
                break;
            }
            if page + 1 == self.config.max_pages {
                warn!("Page limit reached ({}), stopping", self.config.max_pages);
                break;
            }

            tokio::time::sleep(Duration::from_millis(self.config.page_delay_ms)).await;
        }

        if snapshot.rows.is_empty() {
            return Err(TrackerError::Fetch("No player rows found on trends page".to_string()));
        }

        info!("Scraped {} rows in total", snapshot.rows.len());
        Ok(snapshot)
    }
}

/// Parse one trends page into raw rows plus its week indicator
pub fn parse_trends_page(html: &str) -> Result<PageSnapshot> {
    let document = Html::parse_document(html);

    let row_selector = selector("table tbody tr")?;
    let cell_selector = selector("td")?;
    let name_selector = selector("a.playerName")?;
    let link_selector = selector("a")?;
    let em_selector = selector("em")?;

    let mut rows = Vec::new();
    for (row_index, row) in document.select(&row_selector).enumerate() {
        let cells: Vec<ElementRef> = row.select(&cell_selector).collect();
        if cells.len() < 3 {
            debug!("Skipping row {} with {} cells", row_index, cells.len());
            continue;
        }

        let mut raw = RawRow::new();
        let player_cell = cells[0];

        let link = player_cell
            .select(&name_selector)
            .next()
            .or_else(|| player_cell.select(&link_selector).next());
        if let Some(link) = link {
            raw.set(columns::PLAYER_NAME, element_text(&link));
            if let Some(id) = link.value().attr("href").and_then(player_id_from_href) {
                raw.set(columns::PLAYER_ID, id);
            }
        }

        if let Some(em) = player_cell.select(&em_selector).next() {
            raw.set(columns::POSITION_TEAM, element_text(&em));
        }

        raw.set(columns::OPPONENT, element_text(&cells[1]));

        for (cell_index, column) in STAT_COLUMNS {
            if let Some(cell) = cells.get(cell_index) {
                raw.set(column, element_text(cell));
            }
        }

        rows.push(raw);
    }

    Ok(PageSnapshot { rows, week_indicator: find_week_indicator(&document)? })
}

/// First week-looking text on the page; falls back to the first candidate seen
fn find_week_indicator(document: &Html) -> Result<Option<String>> {
    let mut first_candidate = None;

    for css in WEEK_SELECTORS {
        for element in document.select(&selector(css)?) {
            let text = element
                .value()
                .attr("data-week")
                .map(str::to_string)
                .unwrap_or_else(|| element_text(&element));

            if text.is_empty() {
                continue;
            }
            if parse_week_indicator(&text).is_some() {
                return Ok(Some(text));
            }
            first_candidate.get_or_insert(text);
        }
    }

    Ok(first_candidate)
}

/// Extract the numeric `playerId` query parameter from a player link
pub fn player_id_from_href(href: &str) -> Option<String> {
    let (_, rest) = href.split_once("playerId=")?;
    let id: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    (!id.is_empty()).then_some(id)
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| TrackerError::Fetch(format!("Failed to create selector {css}: {e}")))
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body><div id="bd">
          <div class="weekNav"><span class="week-selector">Week 6</span></div>
          <table class="tableType-player">
            <thead><tr><th>Player</th><th>Opp</th><th>Rostered</th></tr></thead>
            <tbody>
              <tr class="player-2560955">
                <td class="playerNameAndInfo">
                  <a class="playerName" href="/players/card?leagueId=0&amp;playerId=2560955">Josh Allen</a>
                  <em>QB - BUF</em>
                </td>
                <td>vs MIA</td>
                <td>99.8%</td><td>+0.1</td><td>95.2%</td><td>-1.4</td><td>1,234</td><td>56</td>
              </tr>
              <tr class="player-2558125">
                <td><a href="/players/card?playerId=2558125">Kyle Pitts</a><em>TE - ATL</em></td>
                <td>@ TB</td>
                <td>71.3%</td><td></td><td>40.0%</td>
              </tr>
              <tr><td colspan="2">Sponsored</td></tr>
            </tbody>
          </table>
        </div></body></html>
    "#;

    #[test]
    fn test_parse_trends_page() {
        let snapshot = parse_trends_page(PAGE).unwrap();
        assert_eq!(snapshot.rows.len(), 2);
        assert_eq!(snapshot.week_indicator.as_deref(), Some("Week 6"));

        let allen = &snapshot.rows[0];
        assert_eq!(allen.get(columns::PLAYER_NAME), Some("Josh Allen"));
        assert_eq!(allen.get(columns::PLAYER_ID), Some("2560955"));
        assert_eq!(allen.get(columns::POSITION_TEAM), Some("QB - BUF"));
        assert_eq!(allen.get(columns::OPPONENT), Some("vs MIA"));
        assert_eq!(allen.get(columns::PERCENT_ROSTERED), Some("99.8%"));
        assert_eq!(allen.get(columns::DROPS), Some("56"));

        let pitts = &snapshot.rows[1];
        assert_eq!(pitts.get(columns::PLAYER_NAME), Some("Kyle Pitts"));
        assert_eq!(pitts.get(columns::PERCENT_ROSTERED_CHANGE), Some(""));
        assert_eq!(pitts.get(columns::ADDS), None);
    }

    #[test]
    fn test_page_without_week() {
        let snapshot = parse_trends_page("<table><tbody></tbody></table>").unwrap();
        assert!(snapshot.rows.is_empty());
        assert!(snapshot.week_indicator.is_none());
    }

    #[test]
    fn test_unparsable_week_candidate_is_kept() {
        let html = r#"<div class="weekly-banner">Trending now</div>"#;
        let snapshot = parse_trends_page(html).unwrap();
        assert_eq!(snapshot.week_indicator.as_deref(), Some("Trending now"));
    }

    #[test]
    fn test_player_id_from_href() {
        assert_eq!(player_id_from_href("/card?playerId=2560955&x=1"), Some("2560955".into()));
        assert_eq!(player_id_from_href("/card?leagueId=0"), None);
        assert_eq!(player_id_from_href("/card?playerId="), None);
    }

    #[test]
    fn test_page_url() {
        let scraper = TrendsPageScraper::new(ScraperConfig::default()).unwrap();
        assert_eq!(scraper.page_url(0), "https://fantasy.nfl.com/research/trends");
        assert_eq!(scraper.page_url(25), "https://fantasy.nfl.com/research/trends?offset=25");
    }
}
