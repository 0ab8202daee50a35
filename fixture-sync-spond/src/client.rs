//! HTTP client for the Spond core API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info, trace};

use crate::api::{EventQuery, SpondApi};
use crate::config::SpondCredentials;
use crate::error::{SpondError, SpondResult};
use crate::types::{AutocompleteLocation, Event, Group, Location, MatchScore, NewEvent};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Spond API client authenticated with a username and password.
///
/// The bearer token is obtained lazily on the first request and renewed once
/// when a request comes back `401 Unauthorized`.
pub struct SpondClient {
    http: reqwest::Client,
    base_url: String,
    credentials: SpondCredentials,
    token: RwLock<Option<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: LoginToken,
}

#[derive(Deserialize)]
struct LoginToken {
    token: String,
}

impl SpondClient {
    pub fn new(credentials: SpondCredentials) -> SpondResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("fixture-sync/{}", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(SpondClient {
            http,
            base_url: credentials.api_url.trim_end_matches('/').to_string(),
            credentials,
            token: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn login(&self) -> SpondResult<String> {
        debug!("Logging in to Spond as {}.", self.credentials.username);
        let response = self
            .http
            .post(self.url("auth2/login"))
            .json(&serde_json::json!({
                "email": self.credentials.username,
                "password": self.credentials.password,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SpondError::Authentication(format!("{}: {}", status, body)));
        }

        let body = response.bytes().await?;
        let login: LoginResponse = serde_json::from_slice(&body)?;
        info!("Logged in to Spond.");
        Ok(login.access_token.token)
    }

    async fn token(&self) -> SpondResult<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(token.clone());
        }
        let mut slot = self.token.write().await;
        if let Some(token) = slot.as_ref() {
            return Ok(token.clone());
        }
        let token = self.login().await?;
        *slot = Some(token.clone());
        Ok(token)
    }

    async fn renew_token(&self, stale: &str) -> SpondResult<String> {
        let mut slot = self.token.write().await;
        if let Some(token) = slot.as_ref().filter(|t| *t != stale) {
            return Ok(token.clone());
        }
        let token = self.login().await?;
        *slot = Some(token.clone());
        Ok(token)
    }

    /// Sends an authenticated request, retrying once with a fresh token on 401.
    async fn send<F>(&self, build: F) -> SpondResult<Response>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let token = self.token().await?;
        let mut response = build(&self.http).bearer_auth(&token).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("Spond token rejected, logging in again.");
            let token = self.renew_token(&token).await?;
            response = build(&self.http).bearer_auth(&token).send().await?;
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpondError::Status { status, body });
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(response: Response) -> SpondResult<T> {
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn events_page(
        &self,
        query: &EventQuery,
        prev_id: Option<&str>,
    ) -> SpondResult<Vec<Event>> {
        let params = event_params(query, prev_id);
        trace!("Fetching events page after {:?}.", prev_id);
        let response = self
            .send(|http| http.get(self.url("sponds")).query(&params))
            .await?;
        Self::json(response).await
    }
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn event_params(query: &EventQuery, prev_id: Option<&str>) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("scheduled", query.include_scheduled.to_string()),
        ("includeHidden", query.include_hidden.to_string()),
        ("includeComments", query.include_comments.to_string()),
        ("excludeRepeating", (!query.include_repeating).to_string()),
        ("addProfileInfo", query.add_profile_info.to_string()),
        (
            "order",
            if query.descending { "desc" } else { "asc" }.to_string(),
        ),
        ("max", query.limit.to_string()),
    ];
    let optional = [
        ("groupId", query.group_id.clone()),
        ("subGroupId", query.sub_group_id.clone()),
        ("minStartTimestamp", query.min_start.map(timestamp)),
        ("maxStartTimestamp", query.max_start.map(timestamp)),
        ("minEndTimestamp", query.min_end.map(timestamp)),
        ("maxEndTimestamp", query.max_end.map(timestamp)),
        ("prevId", prev_id.map(str::to_string)),
    ];
    params.extend(
        optional
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key, v))),
    );
    params
}

#[async_trait]
impl SpondApi for SpondClient {
    async fn list_groups(&self) -> SpondResult<Vec<Group>> {
        let response = self.send(|http| http.get(self.url("groups"))).await?;
        Self::json(response).await
    }

    fn list_events(&self, query: EventQuery) -> BoxStream<'_, SpondResult<Event>> {
        let limit = query.limit as usize;
        futures::stream::try_unfold(
            (query, None::<String>, false),
            move |(query, prev_id, done)| async move {
                if done {
                    return Ok::<_, SpondError>(None);
                }
                let page = self.events_page(&query, prev_id.as_deref()).await?;
                // Spond does not reliably return an empty page at the end.
                let last = page.len() < limit;
                let next = page.last().map(|e| e.id.clone());
                let items = futures::stream::iter(page.into_iter().map(Ok::<_, SpondError>));
                Ok::<_, SpondError>(Some((items, (query, next, last))))
            },
        )
        .try_flatten()
        .boxed()
    }

    async fn create_event(&self, event: &NewEvent) -> SpondResult<Event> {
        let response = self
            .send(|http| http.post(self.url("sponds")).json(event))
            .await?;
        Self::json(response).await
    }

    async fn update_event(&self, event: &Event) -> SpondResult<Event> {
        let path = format!("sponds/{}", event.id);
        let response = self
            .send(|http| {
                http.post(self.url(&path))
                    .header("X-Spond-ClearResponses", "false")
                    .header("X-Spond-SendUpdate", "true")
                    .json(event)
            })
            .await?;
        Self::json(response).await
    }

    async fn update_match_score(&self, id: &str, score: &MatchScore) -> SpondResult<Event> {
        let path = format!("sponds/{}/matchUpdate", id);
        let response = self
            .send(|http| http.post(self.url(&path)).json(score))
            .await?;
        Self::json(response).await
    }

    async fn cancel_event(&self, id: &str, quiet: bool, reason: Option<&str>) -> SpondResult<()> {
        let path = format!("sponds/{}", id);
        let mut params = vec![("quiet", quiet.to_string())];
        if let Some(reason) = reason {
            params.push(("reason", reason.to_string()));
        }
        self.send(|http| http.delete(self.url(&path)).query(&params))
            .await?;
        Ok(())
    }

    async fn autocomplete_location(&self, keyword: &str) -> SpondResult<Vec<AutocompleteLocation>> {
        let response = self
            .send(|http| {
                http.get(self.url("locations/autocomplete"))
                    .query(&[("keyword", keyword)])
            })
            .await?;
        Self::json(response).await
    }

    async fn get_location(&self, id: &str) -> SpondResult<Location> {
        let path = format!("location/{}", id);
        let response = self.send(|http| http.get(self.url(&path))).await?;
        Self::json(response).await
    }
}
