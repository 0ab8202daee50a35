//! Calendar sink seam.

use std::convert::Infallible;
use std::fmt;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::{debug, info};

use crate::error::SyncResult;
use crate::model::{Match, MatchId, Team, TeamId, Triangle};
use crate::time::Time;

/// What a sink did with a create or update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOutcome {
    Created,
    Updated,
    /// The remote event already matches the computed one.
    Unchanged,
    /// The event changed but starts too soon to be rewritten.
    Deferred,
    /// The write was only logged.
    DryRun,
}

/// A downstream calendar that mirrors source matches.
///
/// `create_match` and `update_match` either fully apply or fail with a
/// [`crate::SyncError`]; they never leave a half-written event behind.
#[async_trait]
pub trait DataSink: Send + Sync {
    /// The remote event representation used as the merge base for updates.
    type Existing: fmt::Display + Send + 'static;

    /// Streams events previously created by this system for `team` within the
    /// window, paired with the source match id recovered from each event.
    fn list_existing_matches<'a>(
        &'a self,
        team: &'a TeamId,
        from: Time,
        until: Time,
    ) -> BoxStream<'a, SyncResult<(MatchId, Self::Existing)>>;

    async fn update_match(
        &self,
        triangle: &Triangle,
        fixture: &Match,
        team: &Team,
        existing: Self::Existing,
    ) -> SyncResult<SinkOutcome>;

    async fn create_match(
        &self,
        triangle: &Triangle,
        fixture: &Match,
        team: &Team,
    ) -> SyncResult<SinkOutcome>;
}

/// A sink that has no remote state and logs every write it receives.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl DataSink for LogSink {
    type Existing = Infallible;

    fn list_existing_matches<'a>(
        &'a self,
        _team: &'a TeamId,
        _from: Time,
        _until: Time,
    ) -> BoxStream<'a, SyncResult<(MatchId, Infallible)>> {
        futures::stream::empty().boxed()
    }

    async fn update_match(
        &self,
        _triangle: &Triangle,
        _fixture: &Match,
        _team: &Team,
        existing: Infallible,
    ) -> SyncResult<SinkOutcome> {
        match existing {}
    }

    async fn create_match(
        &self,
        triangle: &Triangle,
        fixture: &Match,
        team: &Team,
    ) -> SyncResult<SinkOutcome> {
        info!("Received match create {} for {}.", fixture, team);
        debug!(
            "Full match create: triangle={:?}, match={:?}, team={:?}",
            triangle, fixture, team
        );
        Ok(SinkOutcome::DryRun)
    }
}
