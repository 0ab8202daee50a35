//! The reconciliation engine.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use indexmap::IndexSet;
use tracing::{debug, error, instrument, trace, warn};

use crate::error::SyncResult;
use crate::model::{Match, MatchId, TeamId};
use crate::sink::{DataSink, SinkOutcome};
use crate::source::DataSource;
use crate::sync::obligations::Obligations;
use crate::sync::{SyncReport, TriangleBuilder};
use crate::time::{Time, TimeSource};

/// Mirrors source matches onto the calendars of the teams of interest.
///
/// One run fetches every match in the window, builds triangles, then walks
/// the teams one at a time: existing remote events are updated in the order
/// the sink yields them and whatever is left for the team is created. Each
/// `(team, match)` pair gets at most one create or update per run.
pub struct SyncService<K: DataSink> {
    time_source: TimeSource,
    source: Arc<dyn DataSource>,
    sink: Arc<K>,
    teams: IndexSet<TeamId>,
    builder: TriangleBuilder,
}

impl<K: DataSink> SyncService<K> {
    pub fn new(
        time_source: TimeSource,
        source: Arc<dyn DataSource>,
        sink: Arc<K>,
        teams: impl IntoIterator<Item = TeamId>,
    ) -> Self {
        SyncService {
            time_source,
            source,
            sink,
            teams: teams.into_iter().collect(),
            builder: TriangleBuilder::default(),
        }
    }

    /// Enables regrouping of broken triangles by start time and venue.
    pub fn with_repair(mut self, repair: bool) -> Self {
        self.builder = TriangleBuilder::new(repair);
        self
    }

    pub fn teams(&self) -> impl Iterator<Item = &TeamId> {
        self.teams.iter()
    }

    /// Runs one sync pass over `[from, until)`, given in the runtime domain.
    ///
    /// Individual write failures are logged and counted in the returned
    /// report. Only source failures and fatal sink errors end the run early.
    #[instrument(skip(self), fields(teams = self.teams.len()))]
    pub async fn sync_matches(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> SyncResult<SyncReport> {
        let from = self.time_source.from_runtime(from);
        let until = self.time_source.from_runtime(until);
        debug!(
            "Starting match sync. from={}, until={}, teams={:?}.",
            from, until, self.teams
        );

        let mut report = SyncReport::default();
        let matches = self.fetch_matches(from, until).await?;
        report.matches = matches.len();
        debug!("Fetched {} matches.", matches.len());

        let triangles = self.builder.build_all(matches);
        report.triangles = triangles.len();
        debug!("Built {} triangles.", triangles.len());

        let mut obligations = Obligations::from_triangles(triangles, &self.teams);
        trace!("Starting match synchronisation of {} obligations.", obligations.len());
        for team in &self.teams {
            self.sync_team(team, &mut obligations, from, until, &mut report)
                .await?;
        }

        for id in obligations.into_leftovers() {
            trace!("[{}] Discarding match not having any teams of interest.", id);
            report.discarded += 1;
        }

        report.log_summary();
        Ok(report)
    }

    async fn fetch_matches(&self, from: Time, until: Time) -> SyncResult<Vec<Match>> {
        let mut stream = self.source.list_matches(from, until);
        let mut seen = HashSet::new();
        let mut matches = Vec::new();
        while let Some(fixture) = stream.next().await {
            let fixture = fixture?;
            if seen.insert(fixture.clone()) {
                matches.push(fixture);
            } else {
                trace!("Dropping duplicate {}.", fixture);
            }
        }
        Ok(matches)
    }

    #[instrument(skip_all, fields(team = %team))]
    async fn sync_team(
        &self,
        team: &TeamId,
        obligations: &mut Obligations,
        from: Time,
        until: Time,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        trace!("[{}] Updating existing matches.", team);
        let mut handled: HashSet<MatchId> = HashSet::new();
        let mut existing = self.sink.list_existing_matches(team, from, until);
        while let Some(item) = existing.next().await {
            let (match_id, event) = match item {
                Ok(item) => item,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let skipped = obligations.drain_team(team).len();
                    error!(
                        "[{}] Failed to list existing matches, skipping {} creates: {}",
                        team, skipped, e
                    );
                    report.skipped_teams.push(team.clone());
                    return Ok(());
                }
            };

            let Some(obligation) = obligations.take(team, &match_id) else {
                if handled.contains(&match_id) {
                    warn!("[{}] Sink match {} is a duplicate of {}.", team, event, match_id);
                } else {
                    warn!("[{}] Sink match {} was not found on source.", team, event);
                }
                report.orphaned.push((team.clone(), match_id));
                continue;
            };

            trace!("[{}] Updating existing sink match {}.", team, event);
            let outcome = self
                .sink
                .update_match(&obligation.triangle, &obligation.fixture, &obligation.team, event)
                .await;
            self.settle(team, &obligation.fixture, outcome, report)?;
            handled.insert(match_id);
        }

        trace!("[{}] Creating new matches.", team);
        for obligation in obligations.drain_team(team) {
            trace!("[{}] Creating new sink match {}.", team, obligation.fixture);
            let outcome = self
                .sink
                .create_match(&obligation.triangle, &obligation.fixture, &obligation.team)
                .await;
            self.settle(team, &obligation.fixture, outcome, report)?;
        }
        Ok(())
    }

    /// Counts a write outcome. Non-fatal failures are logged and swallowed.
    fn settle(
        &self,
        team: &TeamId,
        fixture: &Match,
        outcome: SyncResult<SinkOutcome>,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        match outcome {
            Ok(outcome) => {
                debug!("[{}] {}: {:?}.", team, fixture.id, outcome);
                report.record(outcome);
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!("[{}] Failed to sync {}: {}", team, fixture, e);
                report.failed += 1;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::model::Team;
    use crate::testing::{FakeSink, FakeSource, MatchBuilder, result, triangle_matches};
    use chrono::{TimeDelta, TimeZone};

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let from = Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap();
        (from, from + TimeDelta::days(365))
    }

    fn ids(pairs: &[(&str, &str)]) -> Vec<(TeamId, MatchId)> {
        pairs
            .iter()
            .map(|(team, id)| (TeamId::new(*team), MatchId::new(*id)))
            .collect()
    }

    fn service(
        matches: Vec<Match>,
        sink: Arc<FakeSink>,
        teams: &[&str],
    ) -> SyncService<FakeSink> {
        SyncService::new(
            TimeSource::default(),
            Arc::new(FakeSource::new(matches)),
            sink,
            teams.iter().map(|t| TeamId::new(*t)),
        )
    }

    #[tokio::test]
    async fn test_creates_every_match_for_every_team() {
        let sink = Arc::new(FakeSink::new());
        let service = service(
            triangle_matches("T001", "A", "B", "C"),
            sink.clone(),
            &["A", "B", "C"],
        );
        let (from, until) = window();

        let report = service.sync_matches(from, until).await.unwrap();

        assert_eq!(
            sink.creates(),
            ids(&[
                ("A", "T001a"),
                ("A", "T001c"),
                ("B", "T001a"),
                ("B", "T001b"),
                ("C", "T001b"),
                ("C", "T001c"),
            ])
        );
        assert!(sink.updates().is_empty());
        assert_eq!(report.created, 6);
        assert_eq!(report.triangles, 1);

        let triangles = sink.triangles();
        assert!(triangles.iter().all(|t| t.host == Team::new("A", "A")));
        assert!(triangles.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_creates_only_for_teams_of_interest() {
        let mut matches = triangle_matches("T001", "A", "B", "C");
        matches.extend(triangle_matches("T002", "D", "E", "F"));
        matches.extend(triangle_matches("T003", "A", "E", "G"));
        let sink = Arc::new(FakeSink::new());
        let service = service(matches, sink.clone(), &["A", "E"]);
        let (from, until) = window();

        let report = service.sync_matches(from, until).await.unwrap();

        // A: 2 + 0 + 2, E: 0 + 2 + 2
        assert_eq!(sink.creates().len(), 8);
        assert_eq!(report.created, 8);
        // T001b (B vs C) and T002c (D vs F) involve neither team.
        assert_eq!(report.discarded, 2);
    }

    #[tokio::test]
    async fn test_identical_existing_event_is_left_unchanged() {
        let matches = triangle_matches("T001", "A", "B", "C");
        let sink = Arc::new(FakeSink::new().with_existing("A", matches[0].clone()));
        let service = service(matches, sink.clone(), &["A", "B", "C"]);
        let (from, until) = window();

        let report = service.sync_matches(from, until).await.unwrap();

        assert_eq!(report.unchanged, 1);
        assert_eq!(report.created, 5);
        assert_eq!(sink.updates(), ids(&[("A", "T001a")]));
        assert_eq!(
            sink.creates(),
            ids(&[
                ("A", "T001c"),
                ("B", "T001a"),
                ("B", "T001b"),
                ("C", "T001b"),
                ("C", "T001c"),
            ])
        );
        assert_eq!(sink.writes().len(), 5);
    }

    #[tokio::test]
    async fn test_second_run_writes_nothing() {
        let mut matches = triangle_matches("T001", "A", "B", "C");
        matches.extend(triangle_matches("T002", "C", "D", "E"));
        let sink = Arc::new(FakeSink::new());
        let service = service(matches, sink.clone(), &["A", "B", "C", "D", "E"]);
        let (from, until) = window();

        service.sync_matches(from, until).await.unwrap();
        let first_writes = sink.writes().len();
        assert_eq!(first_writes, 12);

        sink.clear_calls();
        let report = service.sync_matches(from, until).await.unwrap();

        assert!(sink.creates().is_empty());
        assert!(sink.writes().is_empty());
        assert_eq!(sink.updates().len(), 12);
        assert_eq!(report.unchanged, 12);
    }

    #[tokio::test]
    async fn test_changed_result_is_written_once() {
        let matches = triangle_matches("T001", "A", "B", "C");
        let sink = Arc::new(FakeSink::new());
        let (from, until) = window();
        service(matches.clone(), sink.clone(), &["A", "B"])
            .sync_matches(from, until)
            .await
            .unwrap();
        sink.clear_calls();

        let mut played = matches;
        played[0].result = Some(result(&[25, 25, 25], &[20, 18, 23]));
        let report = service(played, sink.clone(), &["A", "B"])
            .sync_matches(from, until)
            .await
            .unwrap();

        assert_eq!(sink.writes(), ids(&[("A", "T001a"), ("B", "T001a")]));
        assert_eq!(report.updated, 2);
        assert_eq!(report.unchanged, 2);
    }

    #[tokio::test]
    async fn test_orphaned_events_are_left_alone() {
        let gone = MatchBuilder::new("T009", 1, "A", "X").build();
        let sink = Arc::new(FakeSink::new().with_existing("A", gone));
        let service = service(triangle_matches("T001", "A", "B", "C"), sink.clone(), &["A"]);
        let (from, until) = window();

        let report = service.sync_matches(from, until).await.unwrap();

        assert!(sink.updates().is_empty());
        assert_eq!(sink.creates(), ids(&[("A", "T001a"), ("A", "T001c")]));
        assert_eq!(report.orphaned, ids(&[("A", "T009a")]));
    }

    #[tokio::test]
    async fn test_malformed_group_does_not_stop_valid_triangle() {
        let mut matches = triangle_matches("T001", "A", "B", "C");
        let mut broken = triangle_matches("T002", "A", "D", "E");
        broken.push(MatchBuilder::new("T002", 4, "D", "B").build());
        matches.extend(broken);
        let sink = Arc::new(FakeSink::new());
        let service = service(matches, sink.clone(), &["A", "B", "C", "D", "E"]);
        let (from, until) = window();

        let report = service.sync_matches(from, until).await.unwrap();

        assert_eq!(report.triangles, 1);
        assert_eq!(sink.creates().len(), 6);
        assert!(sink.creates().iter().all(|(_, id)| id.as_str().starts_with("T001")));
    }

    #[tokio::test]
    async fn test_duplicate_source_matches_are_synced_once() {
        let mut matches = triangle_matches("T001", "A", "B", "C");
        matches.push(matches[1].clone());
        let sink = Arc::new(FakeSink::new());
        let service = service(matches, sink.clone(), &["A", "B", "C"]);
        let (from, until) = window();

        let report = service.sync_matches(from, until).await.unwrap();

        assert_eq!(report.matches, 3);
        assert_eq!(sink.creates().len(), 6);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_stop_the_run() {
        let sink = Arc::new(FakeSink::new().failing_match("T001a"));
        let service = service(
            triangle_matches("T001", "A", "B", "C"),
            sink.clone(),
            &["A", "B", "C"],
        );
        let (from, until) = window();

        let report = service.sync_matches(from, until).await.unwrap();

        assert_eq!(sink.creates().len(), 6);
        assert_eq!(sink.writes().len(), 4);
        assert_eq!(report.failed, 2);
        assert_eq!(report.created, 4);
        assert!(report.has_failures());
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_the_run() {
        let sink = Arc::new(
            FakeSink::new().fatal(SyncError::Precondition("Group not found".into())),
        );
        let service = service(
            triangle_matches("T001", "A", "B", "C"),
            sink.clone(),
            &["A", "B", "C"],
        );
        let (from, until) = window();

        let result = service.sync_matches(from, until).await;

        assert_eq!(result, Err(SyncError::Precondition("Group not found".into())));
        assert_eq!(sink.creates().len(), 1);
    }

    #[tokio::test]
    async fn test_listing_failure_skips_only_that_team() {
        let sink = Arc::new(FakeSink::new().failing_listing("B"));
        let service = service(
            triangle_matches("T001", "A", "B", "C"),
            sink.clone(),
            &["A", "B", "C"],
        );
        let (from, until) = window();

        let report = service.sync_matches(from, until).await.unwrap();

        assert_eq!(
            sink.creates(),
            ids(&[
                ("A", "T001a"),
                ("A", "T001c"),
                ("C", "T001b"),
                ("C", "T001c"),
            ])
        );
        assert_eq!(report.skipped_teams, vec![TeamId::new("B")]);
    }

    #[tokio::test]
    async fn test_source_failure_aborts_before_writing() {
        let sink = Arc::new(FakeSink::new());
        let source = FakeSource::failing(
            triangle_matches("T001", "A", "B", "C"),
            SyncError::Source("league page unavailable".into()),
        );
        let service = SyncService::new(
            TimeSource::default(),
            Arc::new(source),
            sink.clone(),
            [TeamId::new("A")],
        );
        let (from, until) = window();

        let result = service.sync_matches(from, until).await;

        assert!(matches!(result, Err(SyncError::Source(_))));
        assert!(sink.creates().is_empty());
    }

    #[tokio::test]
    async fn test_matches_outside_window_are_ignored() {
        let sink = Arc::new(FakeSink::new());
        let service = service(
            triangle_matches("T001", "A", "B", "C"),
            sink.clone(),
            &["A"],
        );
        let from = Utc.with_ymd_and_hms(2025, 8, 1, 0, 0, 0).unwrap();

        let report = service
            .sync_matches(from, from + TimeDelta::days(365))
            .await
            .unwrap();

        assert_eq!(report.matches, 0);
        assert!(sink.creates().is_empty());
    }

    #[test]
    fn test_report_counts_outcomes() {
        let mut report = SyncReport::default();
        report.record(SinkOutcome::Created);
        report.record(SinkOutcome::Deferred);
        report.record(SinkOutcome::DryRun);

        assert_eq!((report.created, report.deferred, report.dry_run), (1, 1, 1));
        assert!(!report.has_failures());
    }
}
