//! SportsPress REST payloads.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub type SeasonId = u64;
pub type TeamId = u64;
pub type EventId = u64;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Season {
    pub id: SeasonId,
    pub name: String,
}

impl Season {
    /// The year a season name such as "2024-2025" starts in.
    pub fn start_year(&self) -> Option<i32> {
        self.name.split('-').next()?.trim().parse().ok()
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Season(id={}, name={})", self.id, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Team {
    pub id: TeamId,
    #[serde(rename = "title", deserialize_with = "rendered")]
    pub name: String,
    #[serde(default)]
    pub slug: String,
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Team(id={}, name={})", self.id, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Event {
    pub id: EventId,
    #[serde(rename = "title", deserialize_with = "rendered")]
    pub name: String,
    pub teams: Vec<TeamId>,
    /// Free text such as "T12 Host Name".
    #[serde(default)]
    pub day: String,
    pub link: String,
    pub date_gmt: NaiveDateTime,
    pub modified_gmt: NaiveDateTime,
    /// Set scores keyed by team. Empty until the match is played.
    #[serde(default, deserialize_with = "results")]
    pub results: BTreeMap<TeamId, SetScores>,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event(id={}, name={})", self.id, self.name)
    }
}

/// Points of one team in up to three sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetScores {
    pub one: Option<u32>,
    pub two: Option<u32>,
    pub three: Option<u32>,
}

impl SetScores {
    pub fn to_vec(&self) -> Vec<u32> {
        [self.one, self.two, self.three].into_iter().flatten().collect()
    }

    fn from_object(object: &serde_json::Map<String, Value>) -> Self {
        let score = |key: &str| match object.get(key) {
            Some(Value::String(s)) => s.trim().parse().ok(),
            Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            _ => None,
        };
        SetScores {
            one: score("one"),
            two: score("two"),
            three: score("three"),
        }
    }
}

fn rendered<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    struct Rendered {
        rendered: String,
    }
    Ok(Rendered::deserialize(deserializer)?.rendered)
}

/// SportsPress sends `[]` for no results, an object keyed by team id
/// otherwise, with key `"0"` holding the column labels. A malformed entry
/// discards every result of the event.
fn results<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<TeamId, SetScores>, D::Error> {
    let Value::Object(entries) = Value::deserialize(deserializer)? else {
        return Ok(BTreeMap::new());
    };
    let mut results = BTreeMap::new();
    for (key, value) in &entries {
        let Value::Object(scores) = value else {
            return Ok(BTreeMap::new());
        };
        match key.parse::<TeamId>() {
            Ok(0) => {}
            Ok(team) => {
                results.insert(team, SetScores::from_object(scores));
            }
            Err(_) => return Ok(BTreeMap::new()),
        }
    }
    Ok(results)
}
