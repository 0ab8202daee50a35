use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{Team, TeamId, TriangleId, Venue};
use crate::time::Time;

/// Source identifier of a single match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub String);

impl MatchId {
    pub fn new(id: impl Into<String>) -> Self {
        MatchId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One fixture between two teams within a triangle.
///
/// A match is synced once per participating team, so reconciliation keys
/// it by `(team id, match id)` rather than by `id` alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Match {
    /// Where the match was read from (league page, API endpoint, ...).
    pub source: String,
    pub triangle: TriangleId,
    pub id: MatchId,
    /// Position within the triangle, starting at 1. Disambiguates identical start times.
    pub order: u32,
    pub title: String,
    pub venue: Venue,
    pub start: Time,
    pub end: Time,
    pub team_a: Team,
    pub team_b: Team,
    pub result: Option<MatchResult>,
    pub last_updated: Time,
}

/// Final result of a played match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchResult {
    /// Number of sets played.
    pub sets: u32,
    pub team_a: TeamResult,
    pub team_b: TeamResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TeamResult {
    /// Sets won.
    pub sets: u32,
    /// Points per set, when the source publishes them.
    pub scores: Option<Vec<u32>>,
}

impl Match {
    pub fn contains(&self, team: &TeamId) -> bool {
        self.team_a.id == *team || self.team_b.id == *team
    }

    /// The team `team` plays against, if it plays in this match at all.
    pub fn opponent_of(&self, team: &Team) -> Option<&Team> {
        if self.team_a == *team {
            Some(&self.team_b)
        } else if self.team_b == *team {
            Some(&self.team_a)
        } else {
            None
        }
    }

    /// The result split into `(team's result, opponent's result)`.
    pub fn result_for(&self, team: &Team) -> Option<(&TeamResult, &TeamResult)> {
        let result = self.result.as_ref()?;
        if self.team_a == *team {
            Some((&result.team_a, &result.team_b))
        } else if self.team_b == *team {
            Some((&result.team_b, &result.team_a))
        } else {
            None
        }
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Match(id={}, start={}, order={}, title={})",
            self.id, self.start, self.order, self.title
        )
    }
}
