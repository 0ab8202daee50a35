use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::error::SpondResult;
use crate::types::{AutocompleteLocation, Event, Group, Location, MatchScore, NewEvent};

/// Filters for `GET sponds`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventQuery {
    pub group_id: Option<String>,
    pub sub_group_id: Option<String>,
    pub include_scheduled: bool,
    pub include_hidden: bool,
    pub include_repeating: bool,
    pub include_comments: bool,
    pub add_profile_info: bool,
    pub min_start: Option<DateTime<Utc>>,
    pub max_start: Option<DateTime<Utc>>,
    pub min_end: Option<DateTime<Utc>>,
    pub max_end: Option<DateTime<Utc>>,
    pub descending: bool,
    /// Page size. A page shorter than this is the last one.
    pub limit: u32,
}

impl Default for EventQuery {
    fn default() -> Self {
        EventQuery {
            group_id: None,
            sub_group_id: None,
            include_scheduled: false,
            include_hidden: false,
            include_repeating: false,
            include_comments: false,
            add_profile_info: false,
            min_start: None,
            max_start: None,
            min_end: None,
            max_end: None,
            descending: false,
            limit: 20,
        }
    }
}

/// The subset of the Spond core API used by the sink.
#[async_trait]
pub trait SpondApi: Send + Sync {
    /// Every group the authenticated user belongs to, with members.
    async fn list_groups(&self) -> SpondResult<Vec<Group>>;

    /// Events matching `query`, fetched page by page as the stream is polled.
    fn list_events(&self, query: EventQuery) -> BoxStream<'_, SpondResult<Event>>;

    async fn create_event(&self, event: &NewEvent) -> SpondResult<Event>;

    /// Replaces an event without clearing responses and notifies recipients.
    async fn update_event(&self, event: &Event) -> SpondResult<Event>;

    async fn update_match_score(&self, id: &str, score: &MatchScore) -> SpondResult<Event>;

    /// Cancels an event. `quiet` suppresses attendee notifications.
    async fn cancel_event(&self, id: &str, quiet: bool, reason: Option<&str>) -> SpondResult<()>;

    async fn autocomplete_location(&self, keyword: &str) -> SpondResult<Vec<AutocompleteLocation>>;

    async fn get_location(&self, id: &str) -> SpondResult<Location>;
}
