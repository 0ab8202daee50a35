//! In-memory fakes and fixture builders for tests.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{TimeDelta, TimeZone, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;

use crate::error::{SyncError, SyncResult};
use crate::model::{Match, MatchId, MatchResult, Team, TeamId, TeamResult, Triangle, TriangleId, Venue};
use crate::sink::{DataSink, SinkOutcome};
use crate::source::DataSource;
use crate::time::{Time, TimeSource};

/// 2024-09-14T10:00:00Z in the source domain of a zero-offset [`TimeSource`].
pub fn default_start() -> Time {
    let start = Utc.with_ymd_and_hms(2024, 9, 14, 10, 0, 0).single();
    TimeSource::default().from_source(start.unwrap_or_default())
}

/// Builds a [`Match`] with deterministic defaults.
pub struct MatchBuilder {
    fixture: Match,
}

impl MatchBuilder {
    pub fn new(triangle: &str, order: u32, team_a: &str, team_b: &str) -> Self {
        let start = default_start();
        MatchBuilder {
            fixture: Match {
                source: "Test builder".to_string(),
                triangle: TriangleId::new(triangle),
                id: MatchId::new(format!("{triangle}{}", order_suffix(order))),
                order,
                title: format!("{team_a} vs {team_b}"),
                venue: Venue::new(format!("Test Venue address at {team_a}")),
                start,
                end: start + TimeDelta::hours(4),
                team_a: Team::new(team_a, team_a),
                team_b: Team::new(team_b, team_b),
                result: None,
                last_updated: start - TimeDelta::days(7),
            },
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.fixture.id = MatchId::new(id);
        self
    }

    pub fn start(mut self, start: Time) -> Self {
        self.fixture.start = start;
        self.fixture.end = start + TimeDelta::hours(4);
        self
    }

    pub fn venue(mut self, venue: Venue) -> Self {
        self.fixture.venue = venue;
        self
    }

    pub fn result(mut self, result: MatchResult) -> Self {
        self.fixture.result = Some(result);
        self
    }

    pub fn build(self) -> Match {
        self.fixture
    }
}

fn order_suffix(order: u32) -> String {
    match order {
        1..=26 => char::from(b'a' + (order - 1) as u8).to_string(),
        _ => order.to_string(),
    }
}

/// The three matches of a valid triangle hosted by `host`: host vs `b`,
/// `b` vs `c`, host vs `c`, all at the host's venue.
pub fn triangle_matches(triangle: &str, host: &str, b: &str, c: &str) -> Vec<Match> {
    let venue = Venue::new(format!("Test Venue address at {host}"));
    [(host, b), (b, c), (host, c)]
        .into_iter()
        .enumerate()
        .map(|(i, (team_a, team_b))| {
            MatchBuilder::new(triangle, i as u32 + 1, team_a, team_b)
                .venue(venue.clone())
                .build()
        })
        .collect()
}

/// A played result where each side's sets are counted from the per-set scores.
pub fn result(scores_a: &[u32], scores_b: &[u32]) -> MatchResult {
    let won = |ours: &[u32], theirs: &[u32]| {
        ours.iter().zip(theirs).filter(|(o, t)| o > t).count() as u32
    };
    MatchResult {
        sets: scores_a.len() as u32,
        team_a: TeamResult {
            sets: won(scores_a, scores_b),
            scores: Some(scores_a.to_vec()),
        },
        team_b: TeamResult {
            sets: won(scores_b, scores_a),
            scores: Some(scores_b.to_vec()),
        },
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A [`DataSource`] serving a fixed list of matches.
#[derive(Default)]
pub struct FakeSource {
    matches: Vec<Match>,
    error: Option<SyncError>,
}

impl FakeSource {
    pub fn new(matches: Vec<Match>) -> Self {
        FakeSource {
            matches,
            error: None,
        }
    }

    /// Yields every match, then fails.
    pub fn failing(matches: Vec<Match>, error: SyncError) -> Self {
        FakeSource {
            matches,
            error: Some(error),
        }
    }
}

impl DataSource for FakeSource {
    fn list_matches(&self, from: Time, until: Time) -> BoxStream<'_, SyncResult<Match>> {
        let matches = self
            .matches
            .iter()
            .filter(move |m| (from..until).contains(&m.start))
            .cloned()
            .map(Ok);
        let tail = self.error.clone().map(Err);
        futures::stream::iter(matches.chain(tail)).boxed()
    }
}

/// The remote record [`FakeSink`] keeps per written match.
#[derive(Debug, Clone, PartialEq)]
pub struct FakeEvent {
    pub team: TeamId,
    pub fixture: Match,
}

impl fmt::Display for FakeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FakeEvent(team={}, match={})", self.team, self.fixture.id)
    }
}

/// A [`DataSink`] that stores events in memory and records every call.
///
/// Writes are skipped when the stored event already equals the new match,
/// so running the same sync twice leaves `writes` untouched the second time.
#[derive(Default)]
pub struct FakeSink {
    events: Mutex<HashMap<TeamId, Vec<(MatchId, FakeEvent)>>>,
    creates: Mutex<Vec<(TeamId, MatchId)>>,
    updates: Mutex<Vec<(TeamId, MatchId)>>,
    writes: Mutex<Vec<(TeamId, MatchId)>>,
    triangles: Mutex<Vec<Triangle>>,
    failing_matches: HashSet<MatchId>,
    failing_listings: HashSet<TeamId>,
    fatal: Option<SyncError>,
}

impl FakeSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an existing remote event for `team`.
    pub fn with_existing(self, team: &str, fixture: Match) -> Self {
        let team = TeamId::new(team);
        lock(&self.events).entry(team.clone()).or_default().push((
            fixture.id.clone(),
            FakeEvent { team, fixture },
        ));
        self
    }

    /// Rejects every create and update of `id` with a sink error.
    pub fn failing_match(mut self, id: &str) -> Self {
        self.failing_matches.insert(MatchId::new(id));
        self
    }

    /// Fails listing existing events for `team` after yielding what it has.
    pub fn failing_listing(mut self, team: &str) -> Self {
        self.failing_listings.insert(TeamId::new(team));
        self
    }

    /// Fails every write with `error`.
    pub fn fatal(mut self, error: SyncError) -> Self {
        self.fatal = Some(error);
        self
    }

    pub fn creates(&self) -> Vec<(TeamId, MatchId)> {
        lock(&self.creates).clone()
    }

    pub fn updates(&self) -> Vec<(TeamId, MatchId)> {
        lock(&self.updates).clone()
    }

    /// Creates and updates that actually changed a stored event.
    pub fn writes(&self) -> Vec<(TeamId, MatchId)> {
        lock(&self.writes).clone()
    }

    /// Every triangle passed to a create or update.
    pub fn triangles(&self) -> Vec<Triangle> {
        lock(&self.triangles).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.creates).clear();
        lock(&self.updates).clear();
        lock(&self.writes).clear();
        lock(&self.triangles).clear();
    }

    fn check(&self, fixture: &Match) -> SyncResult<()> {
        if let Some(error) = &self.fatal {
            return Err(error.clone());
        }
        if self.failing_matches.contains(&fixture.id) {
            return Err(SyncError::Sink(format!("rejected {}", fixture.id)));
        }
        Ok(())
    }

    fn store(&self, team: &Team, fixture: &Match) {
        let mut events = lock(&self.events);
        let stored = events.entry(team.id.clone()).or_default();
        let event = FakeEvent {
            team: team.id.clone(),
            fixture: fixture.clone(),
        };
        match stored.iter_mut().find(|(id, _)| *id == fixture.id) {
            Some((_, existing)) => *existing = event,
            None => stored.push((fixture.id.clone(), event)),
        }
        lock(&self.writes).push((team.id.clone(), fixture.id.clone()));
    }
}

#[async_trait]
impl DataSink for FakeSink {
    type Existing = FakeEvent;

    fn list_existing_matches<'a>(
        &'a self,
        team: &'a TeamId,
        from: Time,
        until: Time,
    ) -> BoxStream<'a, SyncResult<(MatchId, FakeEvent)>> {
        let existing: Vec<SyncResult<(MatchId, FakeEvent)>> = lock(&self.events)
            .get(team)
            .map(|events| {
                events
                    .iter()
                    .filter(|(_, e)| (from..until).contains(&e.fixture.start))
                    .cloned()
                    .map(Ok)
                    .collect()
            })
            .unwrap_or_default();
        let tail = self
            .failing_listings
            .contains(team)
            .then(|| Err(SyncError::Sink(format!("listing failed for {team}"))));
        futures::stream::iter(existing.into_iter().chain(tail)).boxed()
    }

    async fn update_match(
        &self,
        triangle: &Triangle,
        fixture: &Match,
        team: &Team,
        existing: FakeEvent,
    ) -> SyncResult<SinkOutcome> {
        lock(&self.updates).push((team.id.clone(), fixture.id.clone()));
        lock(&self.triangles).push(triangle.clone());
        self.check(fixture)?;
        if existing.fixture == *fixture {
            return Ok(SinkOutcome::Unchanged);
        }
        self.store(team, fixture);
        Ok(SinkOutcome::Updated)
    }

    async fn create_match(
        &self,
        triangle: &Triangle,
        fixture: &Match,
        team: &Team,
    ) -> SyncResult<SinkOutcome> {
        lock(&self.creates).push((team.id.clone(), fixture.id.clone()));
        lock(&self.triangles).push(triangle.clone());
        self.check(fixture)?;
        self.store(team, fixture);
        Ok(SinkOutcome::Created)
    }
}
