use std::collections::BTreeMap;
use std::time::Duration;

use fixture_sync_core::TeamId;
use fixture_sync_core::serde_util::humantime_duration;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "https://api.spond.com/core/v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpondCredentials {
    pub username: String,
    pub password: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

/// Settings for syncing into one Spond group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpondSinkConfig {
    /// Name of the Spond group.
    pub group: String,
    pub api: SpondCredentials,
    /// Sub-group name to the source team id it mirrors.
    #[serde(default)]
    pub sub_groups: BTreeMap<String, TeamId>,
    /// Also post match results to managed events.
    #[serde(default = "default_true")]
    pub sync_results: bool,
    /// Write events even when nothing changed.
    #[serde(default)]
    pub force_update: bool,
    /// Events starting sooner than this are only rewritten for results.
    #[serde(default = "default_update_lookahead", with = "humantime_duration")]
    pub update_lookahead: Duration,
    #[serde(default)]
    pub events: EventsConfig,
}

fn default_true() -> bool {
    true
}

fn default_update_lookahead() -> Duration {
    Duration::from_secs(60 * 60)
}

impl SpondSinkConfig {
    /// The source teams mirrored into this group.
    pub fn teams(&self) -> Vec<TeamId> {
        self.sub_groups.values().cloned().collect()
    }

    /// The sub-group name mirroring `team`.
    pub fn sub_group_name(&self, team: &TeamId) -> Option<&str> {
        self.sub_groups
            .iter()
            .find(|(_, id)| *id == team)
            .map(|(name, _)| name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub opponent_colour_hex: String,
    /// Days before the start to send invitations at.
    pub invitation_days_before_start: u32,
    /// Days before the start to close RSVPs at.
    pub rsvp_deadline_days_before_start: u32,
    pub max_accepted: u32,
    /// Trailing description line marking events as managed by fixture-sync.
    pub description_byline: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        EventsConfig {
            opponent_colour_hex: "#FFFFFF".to_string(),
            invitation_days_before_start: 6,
            rsvp_deadline_days_before_start: 2,
            max_accepted: 10,
            description_byline: "Managed event.".to_string(),
        }
    }
}
