use std::fmt;

use tracing::{info, warn};

use crate::model::{MatchId, TeamId};
use crate::sink::SinkOutcome;

/// Tally of one sync run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SyncReport {
    pub matches: usize,
    pub triangles: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deferred: usize,
    pub dry_run: usize,
    pub failed: usize,
    /// Remote events whose match no longer exists on the source.
    pub orphaned: Vec<(TeamId, MatchId)>,
    /// Teams whose existing events could not be listed.
    pub skipped_teams: Vec<TeamId>,
    pub discarded: usize,
}

impl SyncReport {
    pub fn record(&mut self, outcome: SinkOutcome) {
        match outcome {
            SinkOutcome::Created => self.created += 1,
            SinkOutcome::Updated => self.updated += 1,
            SinkOutcome::Unchanged => self.unchanged += 1,
            SinkOutcome::Deferred => self.deferred += 1,
            SinkOutcome::DryRun => self.dry_run += 1,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0 || !self.skipped_teams.is_empty()
    }

    pub(crate) fn log_summary(&self) {
        if self.has_failures() {
            warn!("Finished match sync with failures: {}", self);
        } else {
            info!("Finished match sync: {}", self);
        }
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "matches={}, triangles={}, created={}, updated={}, unchanged={}, deferred={}, dry_run={}, failed={}, orphaned={}, skipped_teams={}",
            self.matches,
            self.triangles,
            self.created,
            self.updated,
            self.unchanged,
            self.deferred,
            self.dry_run,
            self.failed,
            self.orphaned.len(),
            self.skipped_teams.len(),
        )
    }
}
