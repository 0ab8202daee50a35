use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, TimeDelta};
use fixture_sync_core::{
    DataSource, Match, MatchId, MatchResult, SyncError, SyncResult, Team, TeamResult, Time,
    TimeSource, TriangleId, Venue,
};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::client::{EventFilter, SportpressClient};
use crate::config::SportpressConfig;
use crate::types::{self, Event, EventId, Season, TeamId};

const TRIANGLE_DURATION: TimeDelta = TimeDelta::hours(4);

/// Season teams and the events of each relevant triangle, in id order.
struct Triangles {
    teams: Arc<HashMap<TeamId, types::Team>>,
    events: Vec<(TriangleId, Vec<Event>)>,
}

/// Reads matches of the configured teams from a SportsPress site.
///
/// A triangle is listed whole as soon as one of its matches involves a
/// configured team.
pub struct SportpressSource {
    client: SportpressClient,
    config: SportpressConfig,
    time_source: TimeSource,
    venue_row: Selector,
}

impl SportpressSource {
    pub fn new(config: SportpressConfig, time_source: TimeSource) -> Result<Self> {
        let venue_row = Selector::parse("tr.sp-event-venue-address-row")
            .map_err(|e| anyhow!("Invalid venue selector: {e}"))?;
        Ok(SportpressSource {
            client: SportpressClient::new(&config)?,
            config,
            time_source,
            venue_row,
        })
    }

    /// The single season whose name starts with the year of `from`.
    async fn active_season(&self, from: Time) -> Result<Season> {
        let year = from.at_source.year();
        debug!("Looking for the SportsPress season of {}.", year);
        let seasons: Vec<Season> = self
            .client
            .list_seasons()
            .inspect_ok(|season| trace!("Found {}", season))
            .try_filter(|season| futures::future::ready(season.start_year() == Some(year)))
            .try_collect()
            .await?;
        match <[Season; 1]>::try_from(seasons) {
            Ok([season]) => {
                info!("Selected SportsPress {}.", season);
                Ok(season)
            }
            Err(seasons) => Err(anyhow!(
                "Expected one SportsPress season starting in {}, found {}",
                year,
                seasons.len()
            )),
        }
    }

    async fn venue(&self, event: &Event) -> Result<String> {
        trace!("Resolving venue of {} from {}.", event, event.link);
        let html = self.client.event_page(&event.link).await?;
        self.parse_venue(&html)
            .ok_or_else(|| anyhow!("No venue address on {}", event.link))
    }

    fn parse_venue(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let row = document.select(&self.venue_row).next()?;
        let cell = row.children().find_map(ElementRef::wrap)?;
        let address = cell
            .text()
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" ");
        (!address.is_empty()).then_some(address)
    }

    /// Events of the active season grouped by triangle, keeping only
    /// triangles in which a configured team plays.
    #[instrument(skip(self))]
    async fn triangles(&self, from: Time, until: Time) -> Result<Triangles> {
        let season = self.active_season(from).await?;
        let teams: HashMap<TeamId, types::Team> = self
            .client
            .list_teams(&[season.id])
            .map_ok(|team| (team.id, team))
            .try_collect()
            .await?;
        for name in &self.config.teams {
            if !teams.values().any(|t| &t.name == name) {
                warn!("SportsPress team {} not found in {}.", name, season);
            }
        }
        let wanted: HashSet<TeamId> = teams
            .values()
            .filter(|t| self.config.teams.contains(&t.name))
            .map(|t| t.id)
            .collect();

        let filter = EventFilter {
            after: Some(from.at_source),
            before: Some(until.at_source),
            seasons: vec![season.id],
        };
        let events: Vec<Event> = self.client.list_events(&filter).try_collect().await?;

        let relevant: HashSet<TriangleId> = events
            .iter()
            .filter(|e| e.teams.iter().any(|id| wanted.contains(id)))
            .filter_map(|e| triangle_of(e).map(|(triangle, _)| triangle))
            .collect();

        let mut by_triangle: BTreeMap<TriangleId, Vec<Event>> = BTreeMap::new();
        for event in events {
            let Some((triangle, host)) = triangle_of(&event) else {
                error!("Cannot find triangle id of {} in {:?}.", event, event.day);
                continue;
            };
            if !relevant.contains(&triangle) {
                trace!("Skipping {} without teams of interest.", event);
                continue;
            }
            debug!("Extracted triangle={}, host={} for {}.", triangle, host, event);
            by_triangle.entry(triangle).or_default().push(event);
        }

        Ok(Triangles {
            teams: Arc::new(teams),
            events: by_triangle.into_iter().collect(),
        })
    }

    /// The ordered matches of one triangle.
    ///
    /// An event whose venue cannot be resolved is dropped, which leaves the
    /// triangle incomplete for the sync to discard.
    async fn triangle_matches(
        &self,
        triangle: TriangleId,
        events: Vec<Event>,
        teams: &HashMap<TeamId, types::Team>,
        from: Time,
        until: Time,
    ) -> Vec<Match> {
        let mut matches = Vec::with_capacity(events.len());
        for event in events {
            let venue = match self.venue(&event).await {
                Ok(venue) => venue,
                Err(e) => {
                    error!("Dropping {} of triangle {}: {:#}", event, triangle, e);
                    continue;
                }
            };
            if let Some(fixture) = self.to_match(&event, triangle.clone(), teams, venue) {
                if fixture.start >= from && fixture.start < until {
                    matches.push((event.id, fixture));
                }
            }
        }
        assign_order(matches)
    }

    fn to_match(
        &self,
        event: &Event,
        triangle: TriangleId,
        teams: &HashMap<TeamId, types::Team>,
        venue: String,
    ) -> Option<Match> {
        let [a, b] = event.teams.as_slice() else {
            error!("{} does not have exactly two teams: {:?}.", event, event.teams);
            return None;
        };
        let (Some(team_a), Some(team_b)) = (teams.get(a), teams.get(b)) else {
            error!("{} has teams outside of the season: {:?}.", event, event.teams);
            return None;
        };
        let start = self.time_source.from_source(event.date_gmt.and_utc());
        Some(Match {
            source: event.link.clone(),
            triangle,
            id: MatchId::new(event.id.to_string()),
            order: 0,
            title: format!("{} vs {}", team_a.name, team_b.name),
            venue: Venue::new(venue),
            start,
            end: start + TRIANGLE_DURATION,
            team_a: Team::new(&team_a.name, &team_a.name),
            team_b: Team::new(&team_b.name, &team_b.name),
            result: result_of(event, *a, *b),
            last_updated: self.time_source.from_source(event.modified_gmt.and_utc()),
        })
    }
}

/// Triangle id and host name from a `day` such as "T12 Host Name".
fn triangle_of(event: &Event) -> Option<(TriangleId, String)> {
    let mut parts = event.day.trim().splitn(2, char::is_whitespace);
    let id = parts.next()?.trim_start_matches('/').trim();
    let host = parts.next().unwrap_or_default().trim_start_matches('/').trim();
    (!id.is_empty()).then(|| (TriangleId::new(id), host.to_string()))
}

/// Numbers the matches of one triangle by start, then event id.
fn assign_order(mut matches: Vec<(EventId, Match)>) -> Vec<Match> {
    matches.sort_by(|(a_id, a), (b_id, b)| a.start.cmp(&b.start).then(a_id.cmp(b_id)));
    matches
        .into_iter()
        .enumerate()
        .map(|(i, (_, mut fixture))| {
            fixture.order = i as u32 + 1;
            fixture
        })
        .collect()
}

fn result_of(event: &Event, a: TeamId, b: TeamId) -> Option<MatchResult> {
    if event.results.is_empty() {
        return None;
    }
    let (Some(a_scores), Some(b_scores)) = (event.results.get(&a), event.results.get(&b)) else {
        warn!("{} has results without both teams.", event);
        return None;
    };
    let (a_scores, b_scores) = (a_scores.to_vec(), b_scores.to_vec());
    let won = |ours: &[u32], theirs: &[u32]| {
        ours.iter().zip(theirs).filter(|(o, t)| o > t).count() as u32
    };
    let (a_sets, b_sets) = (won(&a_scores, &b_scores), won(&b_scores, &a_scores));
    Some(MatchResult {
        sets: a_sets + b_sets,
        team_a: TeamResult {
            sets: a_sets,
            scores: Some(a_scores),
        },
        team_b: TeamResult {
            sets: b_sets,
            scores: Some(b_scores),
        },
    })
}

impl DataSource for SportpressSource {
    fn list_matches(&self, from: Time, until: Time) -> BoxStream<'_, SyncResult<Match>> {
        stream::once(async move {
            self.triangles(from, until)
                .await
                .context("Failed to list SportsPress matches")
                .map_err(|e| SyncError::Source(format!("{e:#}")))
        })
        .map_ok(move |Triangles { teams, events }| {
            stream::iter(events)
                .then(move |(triangle, events)| {
                    let teams = Arc::clone(&teams);
                    async move {
                        self.triangle_matches(triangle, events, &teams, from, until)
                            .await
                    }
                })
                .flat_map(|matches| stream::iter(matches.into_iter().map(Ok)))
        })
        .try_flatten()
        .boxed()
    }
}
