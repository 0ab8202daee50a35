use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::Location;

/// A Spond event ("spond") as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    #[serde(rename = "heading")]
    pub name: String,
    #[serde(rename = "startTimestamp")]
    pub start: DateTime<Utc>,
    #[serde(rename = "endTimestamp")]
    pub end: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_info: Option<MatchInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsvp_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_accepted: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    /// Number of members who accepted, read from the `responses` block.
    pub fn accepted_count(&self) -> u32 {
        self.extra
            .get("responses")
            .and_then(|r| r.get("acceptedIds"))
            .and_then(Value::as_array)
            .map_or(0, |ids| ids.len() as u32)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event(id={}, start={}, name={})",
            self.id,
            self.start.to_rfc3339(),
            self.name
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchType {
    Home,
    Away,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfo {
    pub team_name: String,
    pub opponent_name: String,
    #[serde(rename = "type")]
    pub kind: MatchType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_colour: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent_colour: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores_final: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores_public: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores_set: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores_set_ever: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent_score: Option<u32>,
}

/// Body of `POST sponds/{id}/matchUpdate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchScore {
    pub team_score: Option<u32>,
    pub opponent_score: Option<u32>,
    pub scores_public: Option<bool>,
    pub scores_final: Option<bool>,
}

impl From<&MatchInfo> for MatchScore {
    fn from(info: &MatchInfo) -> Self {
        MatchScore {
            team_score: info.team_score,
            opponent_score: info.opponent_score,
            scores_public: info.scores_public,
            scores_final: info.scores_final,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoReminderType {
    #[default]
    #[serde(rename = "DISABLED")]
    Disabled,
    #[serde(rename = "REMIND_48H_BEFORE")]
    Before48Hours,
    #[serde(rename = "REMIND_48H_AFTER")]
    After48Hours,
}

/// Body of `POST sponds`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    #[serde(rename = "heading")]
    pub name: String,
    pub match_info: MatchInfo,
    pub location: Option<Location>,
    pub recipients: NewRecipients,
    #[serde(rename = "startTimestamp")]
    pub start: DateTime<Utc>,
    #[serde(rename = "endTimestamp")]
    pub end: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsvp_date: Option<DateTime<Utc>>,
    pub max_accepted: Option<u32>,
    pub description: Option<String>,
    pub comments_disabled: bool,
    pub participants_hidden: bool,
    #[serde(rename = "type")]
    pub kind: String,
    pub spond_type: String,
    pub visibility: String,
    pub auto_reminder_type: AutoReminderType,
}

impl NewEvent {
    /// A plain group event with Spond's defaults for everything not given.
    pub fn new(
        name: String,
        match_info: MatchInfo,
        recipients: NewRecipients,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        NewEvent {
            name,
            match_info,
            location: None,
            recipients,
            start,
            end,
            invite_time: None,
            rsvp_date: None,
            max_accepted: None,
            description: None,
            comments_disabled: false,
            participants_hidden: false,
            kind: "EVENT".to_string(),
            spond_type: "event".to_string(),
            visibility: "ALL".to_string(),
            auto_reminder_type: AutoReminderType::Disabled,
        }
    }
}

impl fmt::Display for NewEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NewEvent(name={})", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecipients {
    pub group: NewRecipientsGroup,
    pub guardians: Vec<Value>,
    pub group_members: Vec<String>,
    pub profiles: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecipientsGroup {
    pub id: String,
    pub sub_groups: Vec<String>,
}
