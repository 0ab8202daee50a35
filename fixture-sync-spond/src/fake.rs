//! An in-memory Spond API for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use reqwest::StatusCode;
use serde_json::{Map, json};

use crate::api::{EventQuery, SpondApi};
use crate::error::{SpondError, SpondResult};
use crate::types::{
    AutocompleteLocation, Event, Group, Location, MatchScore, Member, NewEvent, SubGroup,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn not_found(what: &str) -> SpondError {
    SpondError::Status {
        status: StatusCode::NOT_FOUND,
        body: format!("{what} not found"),
    }
}

/// Stores events per sub-group and records every mutating call.
pub struct FakeSpondApi {
    group: Group,
    locations: HashMap<String, Location>,
    events: Mutex<Vec<(String, Event)>>,
    next_id: AtomicUsize,
    creates: Mutex<Vec<NewEvent>>,
    updates: Mutex<Vec<Event>>,
    scores: Mutex<Vec<(String, MatchScore)>>,
    cancels: Mutex<Vec<(String, bool)>>,
    autocompletes: AtomicUsize,
    autocomplete_down: AtomicBool,
    group_listings: AtomicUsize,
}

impl FakeSpondApi {
    /// An API with a single empty group named "My Club".
    pub fn new() -> Self {
        FakeSpondApi {
            group: Group {
                id: "G1".to_string(),
                name: "My Club".to_string(),
                sub_groups: Vec::new(),
                members: Vec::new(),
            },
            locations: HashMap::new(),
            events: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
            creates: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            scores: Mutex::new(Vec::new()),
            cancels: Mutex::new(Vec::new()),
            autocompletes: AtomicUsize::new(0),
            autocomplete_down: AtomicBool::new(false),
            group_listings: AtomicUsize::new(0),
        }
    }

    /// Adds a sub-group `SG-<name>` with one member `M-<name>`.
    pub fn with_sub_group(mut self, name: &str) -> Self {
        let id = format!("SG-{name}");
        self.group.sub_groups.push(SubGroup {
            id: id.clone(),
            name: name.to_string(),
            color: Some("#000080".to_string()),
        });
        self.group.members.push(Member {
            id: format!("M-{name}"),
            sub_groups: vec![id],
        });
        self
    }

    pub fn with_location(mut self, address: &str, feature: &str) -> Self {
        let location = Location {
            feature_name: Some(feature.to_string()),
            feature: Some(feature.to_string()),
            address_line: Some(address.to_string()),
            address: Some(address.to_string()),
            extra: Map::new(),
        };
        self.locations.insert(address.to_string(), location);
        self
    }

    /// Stores an event that was not created through this API.
    pub fn insert_event(&self, sub_group: &str, event: Event) {
        lock(&self.events).push((format!("SG-{sub_group}"), event));
    }

    pub fn events(&self) -> Vec<Event> {
        lock(&self.events).iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn creates(&self) -> Vec<NewEvent> {
        lock(&self.creates).clone()
    }

    pub fn updates(&self) -> Vec<Event> {
        lock(&self.updates).clone()
    }

    pub fn scores(&self) -> Vec<(String, MatchScore)> {
        lock(&self.scores).clone()
    }

    pub fn cancels(&self) -> Vec<(String, bool)> {
        lock(&self.cancels).clone()
    }

    /// Makes every following autocomplete call fail until switched back.
    pub fn fail_autocomplete(&self, fail: bool) {
        self.autocomplete_down.store(fail, Ordering::SeqCst);
    }

    pub fn autocomplete_calls(&self) -> usize {
        self.autocompletes.load(Ordering::SeqCst)
    }

    pub fn group_listings(&self) -> usize {
        self.group_listings.load(Ordering::SeqCst)
    }

    pub fn clear_calls(&self) {
        lock(&self.creates).clear();
        lock(&self.updates).clear();
        lock(&self.scores).clear();
        lock(&self.cancels).clear();
    }

    fn replace(&self, event: Event) -> SpondResult<Event> {
        let mut events = lock(&self.events);
        let slot = events
            .iter_mut()
            .find(|(_, e)| e.id == event.id)
            .ok_or_else(|| not_found("event"))?;
        slot.1 = event.clone();
        Ok(event)
    }
}

#[async_trait]
impl SpondApi for FakeSpondApi {
    async fn list_groups(&self) -> SpondResult<Vec<Group>> {
        self.group_listings.fetch_add(1, Ordering::SeqCst);
        Ok(vec![self.group.clone()])
    }

    fn list_events(&self, query: EventQuery) -> BoxStream<'_, SpondResult<Event>> {
        let matching: Vec<SpondResult<Event>> = lock(&self.events)
            .iter()
            .filter(|(sub_group, _)| {
                query.sub_group_id.as_ref().is_none_or(|id| id == sub_group)
            })
            .filter(|(_, e)| query.min_start.is_none_or(|min| e.start >= min))
            .filter(|(_, e)| query.max_start.is_none_or(|max| e.start <= max))
            .filter(|(_, e)| query.max_end.is_none_or(|max| e.end <= max))
            .map(|(_, e)| Ok(e.clone()))
            .collect();
        stream::iter(matching).boxed()
    }

    async fn create_event(&self, event: &NewEvent) -> SpondResult<Event> {
        lock(&self.creates).push(event.clone());

        let id = format!("E{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut value = serde_json::to_value(event)?;
        if let Some(fields) = value.as_object_mut() {
            fields.insert("id".to_string(), json!(id));
            fields.remove("recipients");
            fields.insert("responses".to_string(), json!({ "acceptedIds": [] }));
            // Scores are only ever set through the score endpoint.
            if let Some(info) = fields.get_mut("matchInfo").and_then(|i| i.as_object_mut()) {
                info.remove("teamScore");
                info.remove("opponentScore");
            }
        }
        let created: Event = serde_json::from_value(value)?;
        let sub_group = event
            .recipients
            .group
            .sub_groups
            .first()
            .cloned()
            .unwrap_or_default();
        lock(&self.events).push((sub_group, created.clone()));
        Ok(created)
    }

    async fn update_event(&self, event: &Event) -> SpondResult<Event> {
        lock(&self.updates).push(event.clone());
        self.replace(event.clone())
    }

    async fn update_match_score(&self, id: &str, score: &MatchScore) -> SpondResult<Event> {
        lock(&self.scores).push((id.to_string(), score.clone()));
        let mut event = lock(&self.events)
            .iter()
            .find(|(_, e)| e.id == id)
            .map(|(_, e)| e.clone())
            .ok_or_else(|| not_found("event"))?;
        if let Some(info) = event.match_info.as_mut() {
            info.team_score = score.team_score;
            info.opponent_score = score.opponent_score;
            info.scores_public = score.scores_public;
            info.scores_final = score.scores_final;
        }
        self.replace(event)
    }

    async fn cancel_event(&self, id: &str, quiet: bool, _reason: Option<&str>) -> SpondResult<()> {
        lock(&self.cancels).push((id.to_string(), quiet));
        let mut events = lock(&self.events);
        let before = events.len();
        events.retain(|(_, e)| e.id != id);
        if events.len() == before {
            return Err(not_found("event"));
        }
        Ok(())
    }

    async fn autocomplete_location(&self, keyword: &str) -> SpondResult<Vec<AutocompleteLocation>> {
        self.autocompletes.fetch_add(1, Ordering::SeqCst);
        if self.autocomplete_down.load(Ordering::SeqCst) {
            return Err(SpondError::Status {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: "autocomplete unavailable".to_string(),
            });
        }
        Ok(self
            .locations
            .get(keyword)
            .map(|l| AutocompleteLocation {
                id: keyword.to_string(),
                name: l.feature().unwrap_or_default().to_string(),
                address_line: l.address_line.clone(),
            })
            .into_iter()
            .collect())
    }

    async fn get_location(&self, id: &str) -> SpondResult<Location> {
        self.locations
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("location"))
    }
}
