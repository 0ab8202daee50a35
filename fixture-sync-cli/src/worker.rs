use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Datelike, TimeDelta, TimeZone, Utc};
use dialoguer::Confirm;
use fixture_sync_core::{
    DataSink, DataSource, LogSink, SyncReport, SyncResult, SyncService, TeamId, TimeSource,
};
use fixture_sync_sportpress::SportpressSource;
use fixture_sync_spond::{SpondClient, SpondSink};
use fixture_sync_volleyzone::VolleyZoneSource;
use tracing::{info, instrument, warn};

use crate::config::{Config, SinkConfig, SourceConfig, SyncConfig};

enum Sink {
    Spond(Arc<SpondSink<SpondClient>>),
    Log(Vec<TeamId>),
}

/// Drives one invocation: cleaning the group and syncing the season.
pub struct SyncWorker {
    time_source: TimeSource,
    settings: SyncConfig,
    source: Arc<dyn DataSource>,
    sink: Sink,
    dry_run: bool,
}

impl SyncWorker {
    pub fn new(config: &Config, time_source: TimeSource, dry_run: bool) -> Result<Self> {
        let source: Arc<dyn DataSource> = match &config.source {
            SourceConfig::Volleyzone(source) => {
                Arc::new(VolleyZoneSource::new(source.clone(), time_source)?)
            }
            SourceConfig::Sportpress(source) => {
                Arc::new(SportpressSource::new(source.clone(), time_source)?)
            }
        };
        let sink = match &config.sink {
            SinkConfig::Spond(sink) => {
                let client = SpondClient::new(sink.api.clone())?;
                Sink::Spond(Arc::new(SpondSink::new(
                    Arc::new(client),
                    sink.clone(),
                    time_source,
                    dry_run,
                )?))
            }
            SinkConfig::Log(sink) => Sink::Log(sink.teams.clone()),
        };

        Ok(SyncWorker {
            time_source,
            settings: config.sync.clone(),
            source,
            sink,
            dry_run,
        })
    }

    /// Syncs the current season.
    pub async fn sync_group(&self) -> Result<SyncReport> {
        let (from, until) = season_window(Utc::now(), &self.settings)?;
        info!("Assuming season from {} until {}.", from, until);
        self.sync_window(from, until).await
    }

    pub async fn sync_window(&self, from: DateTime<Utc>, until: DateTime<Utc>) -> Result<SyncReport> {
        let report = match &self.sink {
            Sink::Spond(sink) => {
                self.run_sync(Arc::clone(sink), sink.teams(), from, until)
                    .await?
            }
            Sink::Log(teams) => {
                self.run_sync(Arc::new(LogSink), teams.clone(), from, until)
                    .await?
            }
        };
        Ok(report)
    }

    async fn run_sync<K: DataSink>(
        &self,
        sink: Arc<K>,
        teams: Vec<TeamId>,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> SyncResult<SyncReport> {
        SyncService::new(self.time_source, Arc::clone(&self.source), sink, teams)
            .with_repair(self.settings.repair_broken_triangles)
            .sync_matches(from, until)
            .await
    }

    /// Cancels every managed event of the current season.
    ///
    /// Asks first unless `yes` is set or this is a dry run.
    #[instrument(skip(self))]
    pub async fn clean_group(&self, yes: bool) -> Result<()> {
        let Sink::Spond(sink) = &self.sink else {
            warn!("The log sink keeps no events, nothing to clean.");
            return Ok(());
        };

        let (from, until) = season_window(Utc::now(), &self.settings)?;
        info!("Assuming season from {} until {}.", from, until);
        let events = sink
            .managed_events(
                self.time_source.from_runtime(from),
                self.time_source.from_runtime(until),
            )
            .await?;
        if events.is_empty() {
            info!("No managed events to clean.");
            return Ok(());
        }

        if !yes && !self.dry_run {
            let confirmed = Confirm::new()
                .with_prompt(format!(
                    "Cancel {} managed {}?",
                    events.len(),
                    if events.len() == 1 { "event" } else { "events" }
                ))
                .default(false)
                .interact()?;

            if !confirmed {
                warn!("Clean declined, aborting.");
                return Ok(());
            }
        }

        let cancelled = sink.cancel_events(&events).await;
        info!("Cancelled {} of {} managed events.", cancelled, events.len());
        Ok(())
    }
}

/// The season containing `now`, given in UTC.
///
/// A season starts at midnight on the 1st of the configured month, so
/// before that month `now` still belongs to last year's season.
pub fn season_window(
    now: DateTime<Utc>,
    settings: &SyncConfig,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let month = settings.season_start_month;
    let year = if now.month() >= month {
        now.year()
    } else {
        now.year() - 1
    };
    let start = Utc
        .with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| anyhow!("Invalid season start month {}", month))?;

    Ok((
        start,
        start + TimeDelta::days(i64::from(settings.season_length_days)),
    ))
}
