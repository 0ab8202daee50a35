//! The Spond [`DataSink`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::TimeDelta;
use fixture_sync_core::single_flight::SingleFlight;
use fixture_sync_core::{
    DataSink, Match, MatchId, SinkOutcome, SyncError, SyncResult, Team, TeamId, Time, TimeSource,
    Triangle,
};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt, future};
use tracing::{debug, info, instrument, trace, warn};

use crate::api::{EventQuery, SpondApi};
use crate::config::SpondSinkConfig;
use crate::event_builder::EventBuilder;
use crate::location::LocationService;
use crate::types::{Event, Group, MatchScore, SubGroup};

/// Page size used when listing events of a group.
const LIST_LIMIT: u32 = 500;

/// Mirrors matches into the sub-groups of one Spond group.
///
/// Each team of interest maps to a sub-group by name. The group itself is
/// resolved once, on first use, however many teams ask for it concurrently.
pub struct SpondSink<A: SpondApi + 'static> {
    api: Arc<A>,
    config: SpondSinkConfig,
    time_source: TimeSource,
    builder: EventBuilder,
    locations: LocationService<A>,
    group: SingleFlight<Arc<Group>>,
    update_lookahead: TimeDelta,
    dry_run: bool,
}

impl<A: SpondApi + 'static> SpondSink<A> {
    pub fn new(
        api: Arc<A>,
        config: SpondSinkConfig,
        time_source: TimeSource,
        dry_run: bool,
    ) -> SyncResult<Self> {
        let update_lookahead = TimeDelta::from_std(config.update_lookahead).map_err(|e| {
            SyncError::Config(format!(
                "Invalid update lookahead {:?}: {}",
                config.update_lookahead, e
            ))
        })?;
        Ok(SpondSink {
            builder: EventBuilder::new(time_source, config.events.clone(), config.sync_results),
            locations: LocationService::new(Arc::clone(&api)),
            group: SingleFlight::new(),
            api,
            config,
            time_source,
            update_lookahead,
            dry_run,
        })
    }

    /// The source teams this sink keeps calendars for.
    pub fn teams(&self) -> Vec<TeamId> {
        self.config.teams()
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    async fn group(&self) -> SyncResult<Arc<Group>> {
        let api = Arc::clone(&self.api);
        let name = self.config.group.clone();
        self.group
            .get_or_fetch(move || async move {
                let groups = api.list_groups().await.map_err(|e| {
                    SyncError::Precondition(format!("Unable to list Spond groups: {e}"))
                })?;
                for group in &groups {
                    trace!("Found group {}", group);
                }
                groups
                    .into_iter()
                    .find(|g| g.name == name)
                    .map(Arc::new)
                    .ok_or_else(|| {
                        SyncError::Precondition(format!("Unable to find Spond group \"{name}\""))
                    })
            })
            .await
    }

    async fn sub_group(&self, team: &TeamId) -> SyncResult<(Arc<Group>, SubGroup)> {
        let group = self.group().await?;
        let name = self.config.sub_group_name(team).ok_or_else(|| {
            SyncError::Precondition(format!("No Spond sub-group is configured for team {team}"))
        })?;
        let sub_group = group
            .sub_groups
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| {
                SyncError::Precondition(format!(
                    "Unable to find sub-group \"{}\" in {}",
                    name, group
                ))
            })?;
        Ok((group, sub_group))
    }

    fn query(&self, group: &Group, from: Time, until: Time) -> EventQuery {
        EventQuery {
            group_id: Some(group.id.clone()),
            min_start: Some(from.at_sink),
            max_start: Some(until.at_sink),
            include_scheduled: true,
            limit: LIST_LIMIT,
            ..EventQuery::default()
        }
    }

    async fn update_score(&self, fixture: &Match, event: &Event) -> SyncResult<()> {
        let Some(info) = &event.match_info else {
            return Ok(());
        };
        info!(
            "[{}] Updating score of {} to {:?}:{:?}.",
            fixture.id, event, info.team_score, info.opponent_score
        );
        self.api
            .update_match_score(&event.id, &MatchScore::from(info))
            .await
            .map(drop)
            .map_err(|e| sink_error(fixture, "persist score update", e))
    }

    /// Every event in the group within the window that this system created.
    pub async fn managed_events(&self, from: Time, until: Time) -> SyncResult<Vec<Event>> {
        let group = self.group().await?;
        self.api
            .list_events(self.query(&group, from, until))
            .try_filter(|event| future::ready(self.builder.is_managed(event)))
            .try_collect()
            .await
            .map_err(|e| SyncError::Sink(format!("Unable to list events of {group}: {e}")))
    }

    /// Quietly cancels `events`, returning how many were cancelled.
    ///
    /// A failed cancellation is logged and the remaining events are still
    /// attempted.
    pub async fn cancel_events(&self, events: &[Event]) -> usize {
        let mut cancelled = 0;
        for event in events {
            if self.dry_run {
                info!("[DRY] Would cancel {}.", event);
                continue;
            }
            match self.api.cancel_event(&event.id, true, None).await {
                Ok(()) => {
                    info!("Cancelled {}.", event);
                    cancelled += 1;
                }
                Err(e) => warn!("Failed to cancel {}: {}", event, e),
            }
        }
        cancelled
    }
}

fn sink_error(fixture: &Match, action: &str, error: impl fmt::Display) -> SyncError {
    SyncError::Sink(format!("[{}] Failed to {}: {:#}", fixture.id, action, error))
}

#[async_trait]
impl<A: SpondApi + 'static> DataSink for SpondSink<A> {
    type Existing = Event;

    fn list_existing_matches<'a>(
        &'a self,
        team: &'a TeamId,
        from: Time,
        until: Time,
    ) -> BoxStream<'a, SyncResult<(MatchId, Event)>> {
        let events = async move {
            let (group, sub_group) = self.sub_group(team).await?;
            let query = EventQuery {
                sub_group_id: Some(sub_group.id),
                ..self.query(&group, from, until)
            };
            let events = self.api.list_events(query).map_err(move |e| {
                SyncError::Sink(format!("Unable to list events of team {team}: {e}"))
            });
            Ok::<_, SyncError>(events)
        };

        stream::once(events)
            .try_flatten()
            .try_filter_map(move |event| {
                let existing = if self.builder.is_managed(&event) {
                    self.builder
                        .extract_match_id(&event)
                        .map(|id| (id, event))
                } else {
                    trace!("Ignoring unmanaged {}.", event);
                    None
                };
                future::ready(Ok(existing))
            })
            .boxed()
    }

    #[instrument(skip_all, fields(match_id = %fixture.id, team = %team.id))]
    async fn update_match(
        &self,
        triangle: &Triangle,
        fixture: &Match,
        team: &Team,
        existing: Event,
    ) -> SyncResult<SinkOutcome> {
        let (_, sub_group) = self.sub_group(&team.id).await?;
        trace!(
            "[{}] Preparing merged spond event data for {}.",
            fixture.id, existing
        );
        let location = self
            .locations
            .resolve(&fixture.venue.address)
            .await
            .map_err(|e| sink_error(fixture, "resolve spond location", e))?;
        let updated = self
            .builder
            .update_event(triangle, fixture, team, &existing, &sub_group, location)
            .map_err(|e| sink_error(fixture, "prepare merged spond event data", e))?;
        debug!("[{}] Merged {} with new data.", fixture.id, existing);

        let results_modified = self.builder.are_results_modified(&existing, &updated);
        if !self.builder.is_modified(&existing, &updated)
            && !results_modified
            && !self.config.force_update
        {
            info!(
                "[{}] Skipping the update, {} is the same as the computed event.",
                fixture.id, existing
            );
            return Ok(SinkOutcome::Unchanged);
        }

        let imminent =
            self.time_source.from_sink(updated.start) <= self.time_source.now() + self.update_lookahead;
        if imminent && !results_modified && !self.config.force_update {
            info!(
                "[{}] Not updating {}, it starts within {:?}.",
                fixture.id, existing, self.config.update_lookahead
            );
            return Ok(SinkOutcome::Deferred);
        }

        if self.dry_run {
            info!("[DRY] [{}] Would update {}.", fixture.id, existing);
            debug!("[DRY] [{}] Updated event: {:?}", fixture.id, updated);
            return Ok(SinkOutcome::DryRun);
        }

        info!("[{}] Updating spond event {}.", fixture.id, existing);
        self.api
            .update_event(&updated)
            .await
            .map_err(|e| sink_error(fixture, "persist spond event update", e))?;
        if results_modified {
            self.update_score(fixture, &updated).await?;
        }
        Ok(SinkOutcome::Updated)
    }

    #[instrument(skip_all, fields(match_id = %fixture.id, team = %team.id))]
    async fn create_match(
        &self,
        triangle: &Triangle,
        fixture: &Match,
        team: &Team,
    ) -> SyncResult<SinkOutcome> {
        let (group, sub_group) = self.sub_group(&team.id).await?;
        trace!("[{}] Preparing spond event data for {}.", fixture.id, fixture);
        let location = self
            .locations
            .resolve(&fixture.venue.address)
            .await
            .map_err(|e| sink_error(fixture, "resolve spond location", e))?;
        let new_event = self
            .builder
            .create_event(triangle, fixture, team, &group, &sub_group, location.clone())
            .map_err(|e| sink_error(fixture, "prepare new spond event data", e))?;

        if self.dry_run {
            info!("[DRY] [{}] Would create {}.", fixture.id, new_event);
            debug!("[DRY] [{}] New event: {:?}", fixture.id, new_event);
            return Ok(SinkOutcome::DryRun);
        }

        info!("[{}] Creating spond event {}.", fixture.id, new_event);
        let created = self
            .api
            .create_event(&new_event)
            .await
            .map_err(|e| sink_error(fixture, "persist new spond event", e))?;

        let updated = self
            .builder
            .update_event(triangle, fixture, team, &created, &sub_group, location)
            .map_err(|e| sink_error(fixture, "prepare merged spond event data", e))?;
        if self.builder.are_results_modified(&created, &updated) {
            self.update_score(fixture, &updated).await?;
        }
        Ok(SinkOutcome::Created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EventsConfig, SpondCredentials};
    use crate::fake::FakeSpondApi;
    use chrono::{DateTime, Utc};
    use fixture_sync_core::SyncService;
    use fixture_sync_core::testing::{FakeSource, result, triangle_matches};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn config() -> SpondSinkConfig {
        SpondSinkConfig {
            group: "My Club".into(),
            api: SpondCredentials {
                username: "user@example.com".into(),
                password: "secret".into(),
                api_url: "http://localhost".into(),
            },
            sub_groups: BTreeMap::from([
                ("Men A".to_string(), TeamId::new("A")),
                ("Men B".to_string(), TeamId::new("B")),
            ]),
            sync_results: true,
            force_update: false,
            update_lookahead: Duration::from_secs(60 * 60),
            events: EventsConfig::default(),
        }
    }

    fn api() -> Arc<FakeSpondApi> {
        Arc::new(
            FakeSpondApi::new()
                .with_sub_group("Men A")
                .with_sub_group("Men B")
                .with_location("Test Venue address at A", "Hall A"),
        )
    }

    fn sink(api: &Arc<FakeSpondApi>, config: SpondSinkConfig, dry_run: bool) -> Arc<SpondSink<FakeSpondApi>> {
        Arc::new(SpondSink::new(Arc::clone(api), config, TimeSource::default(), dry_run).unwrap())
    }

    /// Triangle T001 hosted by A against B and C, starting `offset` from now.
    fn matches_in(offset: TimeDelta) -> Vec<Match> {
        let start = TimeSource::default().from_runtime(Utc::now() + offset);
        let mut matches = triangle_matches("T001", "A", "B", "C");
        for fixture in &mut matches {
            fixture.start = start;
            fixture.end = start + TimeDelta::hours(4);
        }
        matches
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc::now();
        (now - TimeDelta::days(1), now + TimeDelta::days(60))
    }

    async fn run(
        sink: &Arc<SpondSink<FakeSpondApi>>,
        matches: Vec<Match>,
    ) -> SyncResult<fixture_sync_core::SyncReport> {
        let service = SyncService::new(
            TimeSource::default(),
            Arc::new(FakeSource::new(matches)),
            Arc::clone(sink),
            sink.teams(),
        );
        let (from, until) = window();
        service.sync_matches(from, until).await
    }

    #[tokio::test]
    async fn test_second_run_writes_nothing() {
        let api = api();
        let sink = sink(&api, config(), false);
        let matches = matches_in(TimeDelta::days(10));

        let first = run(&sink, matches.clone()).await.unwrap();
        assert_eq!(first.created, 4);
        assert_eq!(api.creates().len(), 4);
        assert!(api.scores().is_empty());

        api.clear_calls();
        let second = run(&sink, matches).await.unwrap();

        assert_eq!(second.unchanged, 4);
        assert!(api.creates().is_empty());
        assert!(api.updates().is_empty());
        assert_eq!(api.autocomplete_calls(), 1);
        assert_eq!(api.group_listings(), 1);
    }

    #[tokio::test]
    async fn test_location_outage_keeps_existing_events() {
        let api = api();
        let matches = matches_in(TimeDelta::days(10));
        run(&sink(&api, config(), false), matches.clone()).await.unwrap();

        api.fail_autocomplete(true);
        api.clear_calls();
        let report = run(&sink(&api, config(), false), matches).await.unwrap();

        assert_eq!(report.failed, 4);
        assert_eq!(report.updated, 0);
        assert!(report.has_failures());
        assert!(api.updates().is_empty());
        assert!(api.events().iter().all(|e| {
            e.location.as_ref().and_then(|l| l.feature()) == Some("Hall A")
        }));
    }

    #[tokio::test]
    async fn test_unknown_venue_is_written_without_location() {
        let api = Arc::new(
            FakeSpondApi::new()
                .with_sub_group("Men A")
                .with_sub_group("Men B"),
        );
        let sink = sink(&api, config(), false);

        let report = run(&sink, matches_in(TimeDelta::days(10))).await.unwrap();

        assert_eq!(report.created, 4);
        assert!(!report.has_failures());
        assert!(api.creates().iter().all(|e| e.location.is_none()));
        assert_eq!(api.autocomplete_calls(), 1);
    }

    #[tokio::test]
    async fn test_created_event_targets_team_sub_group() {
        let api = api();
        let sink = sink(&api, config(), false);

        run(&sink, matches_in(TimeDelta::days(10))).await.unwrap();

        let creates = api.creates();
        let for_a: Vec<_> = creates
            .iter()
            .filter(|e| e.recipients.group.sub_groups == vec!["SG-Men A"])
            .collect();
        assert_eq!(for_a.len(), 2);
        assert!(for_a.iter().all(|e| e.recipients.group_members == vec!["M-Men A"]));
        assert!(for_a.iter().all(|e| e.recipients.group.id == "G1"));
        assert_eq!(
            for_a[0].location.as_ref().and_then(|l| l.feature()),
            Some("Hall A")
        );
    }

    #[tokio::test]
    async fn test_new_result_is_written_once() {
        let api = api();
        let sink = sink(&api, config(), false);
        let mut matches = matches_in(TimeDelta::days(-1) + TimeDelta::hours(2));
        run(&sink, matches.clone()).await.unwrap();

        matches[0].result = Some(result(&[25, 25], &[20, 18]));
        api.clear_calls();
        let report = run(&sink, matches.clone()).await.unwrap();

        // Match a is A vs B: both calendars get the score, nothing else moves.
        assert_eq!(report.updated, 2);
        assert_eq!(report.unchanged, 2);
        let mut scores: Vec<_> = api
            .scores()
            .into_iter()
            .map(|(_, s)| (s.team_score, s.opponent_score))
            .collect();
        scores.sort();
        assert_eq!(scores, vec![(Some(0), Some(2)), (Some(2), Some(0))]);

        api.clear_calls();
        let again = run(&sink, matches).await.unwrap();
        assert_eq!(again.unchanged, 4);
        assert!(api.scores().is_empty());
    }

    #[tokio::test]
    async fn test_created_result_posts_score() {
        let api = api();
        let sink = sink(&api, config(), false);
        let mut matches = matches_in(TimeDelta::days(10));
        matches[1].result = Some(result(&[25, 20, 15], &[20, 25, 10]));

        run(&sink, matches).await.unwrap();

        // Match b is B vs C and only B is of interest.
        let scores = api.scores();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].1.team_score, Some(2));
        assert_eq!(scores[0].1.opponent_score, Some(1));
    }

    #[tokio::test]
    async fn test_imminent_change_is_deferred() {
        let api = api();
        let sink = sink(&api, config(), false);
        let matches = matches_in(TimeDelta::minutes(20));
        run(&sink, matches.clone()).await.unwrap();

        let moved: Vec<_> = matches
            .into_iter()
            .map(|mut m| {
                m.start = m.start + TimeDelta::minutes(10);
                m
            })
            .collect();
        api.clear_calls();
        let report = run(&sink, moved).await.unwrap();

        assert_eq!(report.deferred, 4);
        assert!(api.updates().is_empty());
    }

    #[tokio::test]
    async fn test_force_update_rewrites_unchanged_events() {
        let api = api();
        let matches = matches_in(TimeDelta::days(10));
        run(&sink(&api, config(), false), matches.clone()).await.unwrap();

        let mut forced = config();
        forced.force_update = true;
        api.clear_calls();
        let report = run(&sink(&api, forced, false), matches).await.unwrap();

        assert_eq!(report.updated, 4);
        assert_eq!(api.updates().len(), 4);
    }

    #[tokio::test]
    async fn test_missing_group_aborts_run() {
        let api = api();
        let mut config = config();
        config.group = "Other Club".into();
        let sink = sink(&api, config, false);

        let result = run(&sink, matches_in(TimeDelta::days(10))).await;

        assert!(matches!(result, Err(SyncError::Precondition(_))));
        assert!(api.creates().is_empty());
    }

    #[tokio::test]
    async fn test_missing_sub_group_aborts_run() {
        let api = Arc::new(FakeSpondApi::new().with_sub_group("Men A"));
        let sink = sink(&api, config(), false);

        let result = run(&sink, matches_in(TimeDelta::days(10))).await;

        assert!(matches!(result, Err(SyncError::Precondition(_))));
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let api = api();
        let sink = sink(&api, config(), true);

        let report = run(&sink, matches_in(TimeDelta::days(10))).await.unwrap();

        assert_eq!(report.dry_run, 4);
        assert!(api.creates().is_empty());
        assert!(api.events().is_empty());
    }

    fn training(id: &str) -> Event {
        let start = Utc::now() + TimeDelta::days(3);
        serde_json::from_value(json!({
            "id": id,
            "heading": "Training",
            "startTimestamp": start,
            "endTimestamp": start + TimeDelta::hours(2),
            "description": "Bring water"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_unmanaged_events_are_left_alone() {
        let api = api();
        api.insert_event("Men A", training("X1"));
        let sink = sink(&api, config(), false);

        let report = run(&sink, matches_in(TimeDelta::days(10))).await.unwrap();

        assert_eq!(report.created, 4);
        assert!(report.orphaned.is_empty());
        assert!(api.updates().is_empty());
        assert!(api.events().iter().any(|e| e.id == "X1"));
    }

    #[tokio::test]
    async fn test_clean_cancels_managed_events_only() {
        let api = api();
        let sink = sink(&api, config(), false);
        run(&sink, matches_in(TimeDelta::days(10))).await.unwrap();
        api.insert_event("Men B", training("X1"));
        let (from, until) = window();
        let (from, until) = (
            TimeSource::default().from_runtime(from),
            TimeSource::default().from_runtime(until),
        );

        let managed = sink.managed_events(from, until).await.unwrap();
        assert_eq!(managed.len(), 4);

        assert_eq!(sink.cancel_events(&managed).await, 4);
        assert!(api.cancels().iter().all(|(_, quiet)| *quiet));
        let remaining: Vec<_> = api.events().into_iter().map(|e| e.id).collect();
        assert_eq!(remaining, vec!["X1"]);
    }

    #[tokio::test]
    async fn test_dry_clean_cancels_nothing() {
        let api = api();
        run(&sink(&api, config(), false), matches_in(TimeDelta::days(10)))
            .await
            .unwrap();
        let dry = sink(&api, config(), true);
        let (from, until) = window();
        let managed = dry
            .managed_events(
                TimeSource::default().from_runtime(from),
                TimeSource::default().from_runtime(until),
            )
            .await
            .unwrap();

        assert_eq!(dry.cancel_events(&managed).await, 0);
        assert!(api.cancels().is_empty());
        assert_eq!(api.events().len(), 4);
    }
}
