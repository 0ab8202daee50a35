//! HTML parsing of a single league page.

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Europe::London;
use fixture_sync_core::{
    Match, MatchId, MatchResult, Team, TeamResult, Time, TimeSource, TriangleId, Venue,
};
use indexmap::IndexMap;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, error, info, trace, warn};

/// How long a triangle occupies the venue.
const TRIANGLE_DURATION: TimeDelta = TimeDelta::hours(4);
/// Best of five.
const MAX_SETS: u32 = 5;

/// Selectors and patterns compiled once per source.
pub(crate) struct Patterns {
    fixtures: Selector,
    results: Selector,
    table_body: Selector,
    row: Selector,
    item: Selector,
    data: Selector,
    number: Selector,
    match_id: Regex,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector {css}: {e}"))
}

impl Patterns {
    pub(crate) fn new() -> Result<Self> {
        Ok(Patterns {
            fixtures: selector("#fixtures_league")?,
            results: selector("#results_league")?,
            table_body: selector(".table-body")?,
            row: selector("ul")?,
            item: selector("li")?,
            data: selector(".data")?,
            number: selector("span")?,
            match_id: Regex::new(r"[A-Z]\d{3}[a-z]")?,
        })
    }
}

/// Parses matches out of one league page.
pub(crate) struct LeagueParser<'a> {
    pub source: &'a str,
    pub patterns: &'a Patterns,
    pub addresses: &'a IndexMap<String, String>,
    pub time_source: TimeSource,
}

impl LeagueParser<'_> {
    /// Every well-formed fixture and result on the page, fixtures first.
    ///
    /// Malformed rows are logged and skipped, and a missing table only
    /// loses its own rows.
    pub fn parse(&self, html: &str) -> Vec<Match> {
        let document = Html::parse_document(html);
        let last_updated = self.time_source.from_source(Utc::now());
        let mut matches = Vec::new();

        match document.select(&self.patterns.fixtures).next() {
            None => error!("[{}] Unable to find fixtures.", self.source),
            Some(table) => {
                trace!("[{}] Parsing fixtures.", self.source);
                for row in table.select(&self.patterns.table_body) {
                    if let Some(fixture) = self.parse_fixture(row, last_updated) {
                        debug!("[{}] Parsed fixture {}", self.source, fixture);
                        matches.push(fixture);
                    }
                }
            }
        }

        match document.select(&self.patterns.results).next() {
            None => error!("[{}] Unable to find results.", self.source),
            Some(table) => {
                trace!("[{}] Parsing results.", self.source);
                let rows: Vec<ElementRef> = table
                    .select(&self.patterns.row)
                    .filter(|row| !has_class(row, "table-header"))
                    .collect();
                for pair in rows.chunks_exact(2) {
                    if let Some(fixture) = self.parse_result(pair[0], pair[1], last_updated) {
                        debug!("[{}] Parsed result {}", self.source, fixture);
                        matches.push(fixture);
                    }
                }
            }
        }

        matches
    }

    fn parse_fixture(&self, row: ElementRef, last_updated: Time) -> Option<Match> {
        let home_team = attr(&row, "data-hometeam");
        let away_team = attr(&row, "data-awayteam");
        let date = attr(&row, "data-date");
        let time = attr(&row, "data-time");
        let venue = attr(&row, "data-venue");
        let comment = attr(&row, "data-comment");
        let venue_extra = row
            .select(&self.patterns.item)
            .nth(5)
            .and_then(|item| item.select(&self.patterns.data).next())
            .map(|data| text(&data))
            .filter(|extra| extra.to_lowercase().starts_with(&venue.to_lowercase()));

        let Some(id) = self.patterns.match_id.find(comment) else {
            error!(
                "Cannot find match id: date={}, time={}, home_team={}, away_team={}, venue={}, comment={}",
                date, time, home_team, away_team, venue, comment
            );
            trace!("row={}", row.html());
            return None;
        };
        let id = id.as_str();
        let order = match id.chars().last() {
            Some('a') => 1,
            Some('b') => 2,
            Some('c') => 3,
            _ => {
                error!(
                    "[{}] Cannot determine match order: date={}, time={}, home_team={}, away_team={}",
                    id, date, time, home_team, away_team
                );
                return None;
            }
        };
        let start = match parse_start(date, time) {
            Ok(start) => self.time_source.from_source(start),
            Err(e) => {
                error!("[{}] Cannot parse start {} {}: {}", id, date, time, e);
                return None;
            }
        };

        let venue = Venue {
            address: venue.to_string(),
            alternative_address: venue_extra,
        };
        Some(Match {
            source: self.source.to_string(),
            triangle: TriangleId::new(&id[..id.len() - 1]),
            id: MatchId::new(id),
            order,
            title: format!("{home_team} vs {away_team}"),
            venue: self.resolve_address(id, venue),
            start,
            end: start + TRIANGLE_DURATION,
            team_a: Team::new(home_team, home_team),
            team_b: Team::new(away_team, away_team),
            result: None,
            last_updated,
        })
    }

    fn parse_result(&self, row: ElementRef, scores: ElementRef, last_updated: Time) -> Option<Match> {
        if !has_class(&row, "table-body") || !has_class(&scores, "list-centered_bottom_league") {
            return None;
        }
        let mut fixture = self.parse_fixture(row, last_updated)?;

        trace!("[{}] Parsing scores.", fixture.id);
        let (Some(home_sets), Some(away_sets)) = (
            parse_sets(attr(&row, "data-homescore")),
            parse_sets(attr(&row, "data-awayscore")),
        ) else {
            error!("[{}] Cannot parse sets won.", fixture.id);
            return None;
        };
        if home_sets.checked_add(away_sets).is_none_or(|won| won > MAX_SETS) {
            error!(
                "[{}] Implausible sets won {}:{}, dropping result.",
                fixture.id, home_sets, away_sets
            );
            return None;
        }
        let set_scores: Vec<Vec<u32>> = scores
            .select(&self.patterns.item)
            .filter_map(|item| {
                let numbers: Vec<u32> = item
                    .select(&self.patterns.number)
                    .filter_map(|span| text(&span).parse().ok())
                    .collect();
                (numbers.len() >= 2).then_some(numbers)
            })
            .collect();
        debug!(
            "[{}] Parsed scores: home_sets={}, away_sets={}, set_scores={:?}",
            fixture.id, home_sets, away_sets, set_scores
        );

        let (sets, set_scores) = repair_set_scores(&fixture.id, home_sets, away_sets, set_scores);
        let side = |pick: fn(&[u32]) -> Option<&u32>| -> Option<Vec<u32>> {
            let scores: Vec<u32> = set_scores.iter().filter_map(|s| pick(s.as_slice()).copied()).collect();
            (!scores.is_empty()).then_some(scores)
        };
        fixture.result = Some(MatchResult {
            sets,
            team_a: TeamResult {
                sets: home_sets,
                scores: side(<[u32]>::first),
            },
            team_b: TeamResult {
                sets: away_sets,
                scores: side(<[u32]>::last),
            },
        });
        Some(fixture)
    }

    /// Replaces the venue with a configured full address, or falls back to
    /// the most descriptive address on the page.
    fn resolve_address(&self, id: &str, venue: Venue) -> Venue {
        trace!("[{}] Resolving address.", id);
        let prefixed = |value: &str, prefix: &str| {
            value.to_lowercase().starts_with(&prefix.to_lowercase())
        };
        let mapped = self.addresses.iter().find(|(prefix, _)| {
            prefixed(&venue.address, prefix)
                || venue
                    .alternative_address
                    .as_deref()
                    .is_some_and(|alt| prefixed(alt, prefix))
        });

        match mapped {
            Some((_, address)) => {
                debug!("[{}] Resolved {} to mapped {} address.", id, venue, address);
                Venue {
                    address: address.clone(),
                    ..venue
                }
            }
            None => {
                let fallback = venue
                    .alternative_address
                    .clone()
                    .unwrap_or_else(|| format!("{}, England, United Kingdom", venue.address));
                debug!(
                    "[{}] Unable to map address {}. Falling back to {}.",
                    id, venue, fallback
                );
                Venue {
                    address: fallback,
                    alternative_address: Some(venue.address),
                }
            }
        }
    }
}

fn attr<'a>(element: &ElementRef<'a>, name: &str) -> &'a str {
    element.value().attr(name).unwrap_or_default().trim()
}

fn has_class(element: &ElementRef, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

/// Element text with whitespace runs collapsed.
fn text(element: &ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_sets(value: &str) -> Option<u32> {
    if value.is_empty() {
        Some(0)
    } else {
        value.parse().ok()
    }
}

/// Start of a match given as "14 Sep 2024" and "10:00" UK local time.
fn parse_start(date: &str, time: &str) -> Result<chrono::DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date, "%d %b %Y")?;
    let time = NaiveTime::parse_from_str(time, "%H:%M")?;
    London
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|start| start.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("{date} {time} does not exist in Europe/London"))
}

/// Reconciles per-set scores with the sets-won tally.
///
/// League pages sometimes repeat the final tally as an extra score row.
/// Returns the number of sets played and the scores to keep.
fn repair_set_scores(
    id: &MatchId,
    home_sets: u32,
    away_sets: u32,
    scores: Vec<Vec<u32>>,
) -> (u32, Vec<Vec<u32>>) {
    let won = (home_sets + away_sets) as usize;
    let tied = scores.iter().any(|s| s.first() == s.get(1));

    if scores.len() > won && !tied {
        let tally = [home_sets, away_sets];
        let fixed: Vec<Vec<u32>> = scores
            .iter()
            .filter(|s| s.as_slice() != tally)
            .cloned()
            .collect();
        if fixed.len() == won {
            info!("[{}] Fixed invalid set scores.", id);
            (won as u32, fixed)
        } else {
            error!("[{}] Invalid set scores.", id);
            debug!(
                "[{}] Sets from final results were {}, however sets from scores were {}. Discarding all scores.",
                id,
                won,
                scores.len()
            );
            (won as u32, Vec::new())
        }
    } else if scores.len() < won {
        warn!("[{}] Missing set scores.", id);
        debug!(
            "[{}] Sets from final results were {}, however sets from scores were {}.",
            id,
            won,
            scores.len()
        );
        (won as u32, scores)
    } else {
        (scores.len() as u32, scores)
    }
}
