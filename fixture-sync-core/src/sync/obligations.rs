use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::model::{Match, MatchId, Team, TeamId, Triangle};

/// A pending create-or-update of one match on one team's calendar.
pub(crate) struct Obligation {
    pub triangle: Arc<Triangle>,
    pub fixture: Match,
    pub team: Team,
}

/// Obligations keyed by `(team id, match id)`, in the order they were registered.
#[derive(Default)]
pub(crate) struct Obligations {
    pending: IndexMap<(TeamId, MatchId), Obligation>,
    /// Matches where neither side is a team of interest.
    unclaimed: Vec<MatchId>,
}

impl Obligations {
    pub fn from_triangles(triangles: Vec<Triangle>, teams: &IndexSet<TeamId>) -> Self {
        let mut obligations = Obligations::default();
        for triangle in triangles {
            let triangle = Arc::new(triangle);
            for fixture in &triangle.matches {
                let mut claimed = false;
                for team in [&fixture.team_a, &fixture.team_b] {
                    if !teams.contains(&team.id) {
                        continue;
                    }
                    claimed = true;
                    obligations.pending.insert(
                        (team.id.clone(), fixture.id.clone()),
                        Obligation {
                            triangle: triangle.clone(),
                            fixture: fixture.clone(),
                            team: team.clone(),
                        },
                    );
                }
                if !claimed {
                    obligations.unclaimed.push(fixture.id.clone());
                }
            }
        }
        obligations
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Removes the obligation for `(team, id)`, keeping the order of the rest.
    pub fn take(&mut self, team: &TeamId, id: &MatchId) -> Option<Obligation> {
        self.pending.shift_remove(&(team.clone(), id.clone()))
    }

    /// Removes and returns every obligation of `team`, in registration order.
    pub fn drain_team(&mut self, team: &TeamId) -> Vec<Obligation> {
        let (mine, rest): (IndexMap<_, _>, IndexMap<_, _>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|((owner, _), _)| owner == team);
        self.pending = rest;
        mine.into_values().collect()
    }

    /// Everything that was never consumed by a team's reconciliation.
    pub fn into_leftovers(self) -> impl Iterator<Item = MatchId> {
        self.pending
            .into_values()
            .map(|o| o.fixture.id)
            .chain(self.unclaimed)
    }
}
