//! HTTP client for the SportsPress REST API.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::config::SportpressConfig;
use crate::types::{Event, Season, SeasonId, Team};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TOTAL_PAGES_HEADER: &str = "X-WP-TotalPages";
const PAGE_SIZE: u32 = 100;

/// Restricts [`SportpressClient::list_events`] to a publication window and seasons.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub seasons: Vec<SeasonId>,
}

pub struct SportpressClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<(String, Option<String>)>,
}

impl SportpressClient {
    pub fn new(config: &SportpressConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("fixture-sync/{}", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(SportpressClient {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            credentials: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
        })
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self.http.get(url);
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, password.as_ref()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.context("SportsPress request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let url = response.url().to_string();
            let body = response.text().await.unwrap_or_default();
            bail!("SportsPress request {} failed ({}): {}", url, status, body);
        }
        Ok(response)
    }

    /// Every item of a collection endpoint, fetched page by page while
    /// `X-WP-TotalPages` says more pages exist.
    fn paginate<T>(&self, path: &'static str, params: Vec<(&'static str, String)>) -> BoxStream<'_, Result<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let url = format!("{}/{}", self.base_url, path);
        futures::stream::try_unfold(Some(1u32), move |page| {
            let url = url.clone();
            let params = params.clone();
            async move {
                let Some(page) = page else {
                    return Ok::<_, anyhow::Error>(None);
                };
                trace!("Fetching {} page {}.", url, page);
                let request = self
                    .get(&url)
                    .query(&params)
                    .query(&[("per_page", PAGE_SIZE), ("page", page)]);
                let response = self.send(request).await?;
                let total_pages: u32 = response
                    .headers()
                    .get(TOTAL_PAGES_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(0);
                let body = response.bytes().await?;
                let items: Vec<T> = serde_json::from_slice(&body)
                    .with_context(|| format!("Failed to decode {url} page {page}"))?;

                let next = (page < total_pages && !items.is_empty()).then_some(page + 1);
                let items = futures::stream::iter(items.into_iter().map(Ok::<T, anyhow::Error>));
                Ok(Some((items, next)))
            }
        })
        .try_flatten()
        .boxed()
    }

    pub fn list_seasons(&self) -> BoxStream<'_, Result<Season>> {
        self.paginate("seasons", Vec::new())
    }

    pub fn list_teams(&self, seasons: &[SeasonId]) -> BoxStream<'_, Result<Team>> {
        self.paginate("teams", seasons_param(seasons).into_iter().collect())
    }

    pub fn list_events(&self, filter: &EventFilter) -> BoxStream<'_, Result<Event>> {
        let mut params: Vec<(&'static str, String)> = seasons_param(&filter.seasons).into_iter().collect();
        if let Some(after) = filter.after {
            params.push(("after", wp_date(after)));
        }
        if let Some(before) = filter.before {
            params.push(("before", wp_date(before)));
        }
        self.paginate("events", params)
    }

    /// The public HTML page of an event.
    pub async fn event_page(&self, link: &str) -> Result<String> {
        let response = self.send(self.get(link)).await?;
        response
            .text()
            .await
            .with_context(|| format!("Failed to read {link}"))
    }
}

fn seasons_param(seasons: &[SeasonId]) -> Option<(&'static str, String)> {
    (!seasons.is_empty()).then(|| {
        let ids: Vec<String> = seasons.iter().map(ToString::to_string).collect();
        ("seasons", ids.join(","))
    })
}

/// WordPress expects local ISO 8601 without an offset.
fn wp_date(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%dT%H:%M:%S").to_string()
}
