use anyhow::{Context, Result, bail};
use fixture_sync_core::{DataSource, Match, SyncError, SyncResult, Time, TimeSource};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt, future};
use tracing::{debug, instrument};

use crate::config::VolleyZoneConfig;
use crate::parser::{LeagueParser, Patterns};

/// Reads matches from the configured VolleyZone league pages.
pub struct VolleyZoneSource {
    http: reqwest::Client,
    config: VolleyZoneConfig,
    time_source: TimeSource,
    patterns: Patterns,
}

impl VolleyZoneSource {
    pub fn new(config: VolleyZoneConfig, time_source: TimeSource) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("fixture-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(VolleyZoneSource {
            http,
            config,
            time_source,
            patterns: Patterns::new()?,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_league(&self, url: &str) -> Result<String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {url}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Fetching {} failed ({}): {}", url, status, body);
        }

        response
            .text()
            .await
            .with_context(|| format!("Failed to read {url}"))
    }

    async fn league_matches(&self, name: &str, url: &str) -> SyncResult<Vec<Match>> {
        debug!("[{}] Fetching matches for {}.", url, name);
        let html = self
            .fetch_league(url)
            .await
            .map_err(|e| SyncError::Source(format!("{e:#}")))?;
        let parser = LeagueParser {
            source: url,
            patterns: &self.patterns,
            addresses: &self.config.addresses,
            time_source: self.time_source,
        };
        Ok(parser.parse(&html))
    }
}

impl DataSource for VolleyZoneSource {
    fn list_matches(&self, from: Time, until: Time) -> BoxStream<'_, SyncResult<Match>> {
        stream::iter(&self.config.leagues)
            .then(move |(name, url)| async move {
                let matches = self.league_matches(name, url).await?;
                Ok::<_, SyncError>(stream::iter(matches.into_iter().map(Ok)))
            })
            .try_flatten()
            .try_filter(move |fixture| {
                let fits = fixture.start >= from && fixture.start < until;
                if !fits {
                    debug!(
                        "[{}] Discarding {} since it does not start within {}..{}.",
                        fixture.source, fixture.id, from, until
                    );
                }
                future::ready(fits)
            })
            .boxed()
    }
}
