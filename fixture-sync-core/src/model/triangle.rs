use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{Match, Team, Venue};
use crate::time::Time;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriangleId(pub String);

impl TriangleId {
    pub fn new(id: impl Into<String>) -> Self {
        TriangleId(id.into())
    }
}

impl fmt::Display for TriangleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A three team round-robin: every pair plays once and the host plays
/// two of the three matches as team A.
///
/// Built by [`crate::sync::TriangleBuilder`], which guarantees exactly
/// three matches sharing the host's venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Triangle {
    pub id: TriangleId,
    pub venue: Venue,
    /// Earliest match start.
    pub start: Time,
    /// Latest match *start*, not latest match end.
    pub end: Time,
    pub host: Team,
    /// The three participating teams, sorted by name.
    pub teams: [Team; 3],
    /// The three matches in the order they were received.
    pub matches: [Match; 3],
}

impl Triangle {
    pub fn is_host(&self, team: &Team) -> bool {
        self.host == *team
    }
}

impl fmt::Display for Triangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Triangle(id={},venue={},start={})",
            self.id, self.venue, self.start
        )
    }
}
