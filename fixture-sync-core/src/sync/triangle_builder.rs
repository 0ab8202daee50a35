//! Groups matches into validated three team triangles.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::constants::TRIANGLE_SIZE;
use crate::error::SyncError;
use crate::model::{Match, Team, Triangle, TriangleId, Venue};

/// Why a group of matches could not form a triangle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TriangleDefect {
    #[error("Triangle has {0} != 3 matches")]
    Size(usize),

    #[error("Expected most frequent A team to be A team for 2 matches, was {0}")]
    NoHost(usize),

    #[error("Detected different venues for host {host}: {venues:?}")]
    HostVenues { host: String, venues: Vec<String> },

    #[error("Expected 3 distinct teams, found {0}")]
    Teams(usize),
}

impl From<TriangleDefect> for SyncError {
    fn from(defect: TriangleDefect) -> Self {
        SyncError::DataQuality(defect.to_string())
    }
}

/// Builds [`Triangle`]s out of the matches of one sync run.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriangleBuilder {
    /// Regroup rejected matches by start and venue and try again.
    repair: bool,
}

impl TriangleBuilder {
    pub fn new(repair: bool) -> Self {
        TriangleBuilder { repair }
    }

    /// Groups `matches` by triangle id and keeps every group that forms a valid
    /// triangle, in the order the groups were first seen. Rejected groups are
    /// logged and dropped, or handed to the repair pass when it is enabled.
    pub fn build_all(&self, matches: Vec<Match>) -> Vec<Triangle> {
        let mut groups: IndexMap<TriangleId, Vec<Match>> = IndexMap::new();
        for fixture in matches {
            groups.entry(fixture.triangle.clone()).or_default().push(fixture);
        }

        let mut triangles = Vec::with_capacity(groups.len());
        let mut rejected = Vec::new();
        for (id, group) in groups {
            match self.build(&id, &group) {
                Ok(triangle) => triangles.push(triangle),
                Err(defect) => {
                    error!("[{}] {}.", id, defect);
                    rejected.push(group);
                }
            }
        }

        if !rejected.is_empty() {
            warn!("Detected {} broken triangles!", rejected.len());
            if self.repair {
                triangles.extend(self.repair(rejected.into_iter().flatten().collect()));
            } else {
                for group in rejected {
                    let ids: Vec<_> = group.iter().map(|m| m.id.as_str()).collect();
                    warn!("Discarding broken triangle: {:?}", ids);
                }
            }
        }

        triangles
    }

    /// Validates one group of matches sharing `id`.
    pub fn build(&self, id: &TriangleId, matches: &[Match]) -> Result<Triangle, TriangleDefect> {
        if matches.len() != TRIANGLE_SIZE {
            return Err(TriangleDefect::Size(matches.len()));
        }

        let mut by_team_a: IndexMap<&Team, Vec<&Match>> = IndexMap::new();
        for fixture in matches {
            by_team_a.entry(&fixture.team_a).or_default().push(fixture);
        }
        let (host, hosted) = by_team_a
            .iter()
            .max_by_key(|(_, hosted)| hosted.len())
            .map(|(team, hosted)| (*team, hosted))
            .ok_or(TriangleDefect::Size(0))?;
        if hosted.len() != 2 {
            return Err(TriangleDefect::NoHost(hosted.len()));
        }

        let venues: Vec<&Venue> = hosted.iter().map(|m| &m.venue).collect();
        if venues.iter().any(|v| *v != venues[0]) {
            return Err(TriangleDefect::HostVenues {
                host: host.to_string(),
                venues: venues.iter().map(|v| v.to_string()).collect(),
            });
        }
        let venue = venues[0].clone();

        let mut teams: Vec<Team> = Vec::with_capacity(TRIANGLE_SIZE);
        for fixture in matches {
            for team in [&fixture.team_a, &fixture.team_b] {
                if !teams.contains(team) {
                    teams.push(team.clone());
                }
            }
        }
        teams.sort_by(|a, b| a.name.cmp(&b.name));
        let teams: [Team; 3] = teams
            .try_into()
            .map_err(|teams: Vec<Team>| TriangleDefect::Teams(teams.len()))?;

        let start = matches.iter().map(|m| m.start).min().ok_or(TriangleDefect::Size(0))?;
        // Latest start, not latest end.
        let end = matches.iter().map(|m| m.start).max().ok_or(TriangleDefect::Size(0))?;

        let matches: [Match; 3] = matches
            .to_vec()
            .try_into()
            .map_err(|matches: Vec<Match>| TriangleDefect::Size(matches.len()))?;

        debug!("[{}] Built triangle hosted by {}.", id, host);
        Ok(Triangle {
            id: id.clone(),
            venue,
            start,
            end,
            host: host.clone(),
            teams,
            matches,
        })
    }

    /// Regroups matches from rejected groups by start time and venue address.
    ///
    /// Each regrouped set takes the triangle id most of its members carried
    /// and its matches are rewritten to agree with it.
    fn repair(&self, matches: Vec<Match>) -> Vec<Triangle> {
        let mut groups: IndexMap<(i64, String), Vec<Match>> = IndexMap::new();
        for fixture in matches {
            let key = (
                fixture.start.at_source.timestamp(),
                fixture.venue.address.clone(),
            );
            groups.entry(key).or_default().push(fixture);
        }

        let mut repaired = Vec::new();
        for (_, mut group) in groups {
            let mut votes: BTreeMap<&TriangleId, usize> = BTreeMap::new();
            for fixture in &group {
                *votes.entry(&fixture.triangle).or_default() += 1;
            }
            // Most common id wins, ties go to the smallest.
            let Some(id) = votes
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(id, _)| (*id).clone())
            else {
                continue;
            };
            if group.len() != TRIANGLE_SIZE {
                let names: Vec<_> = group.iter().map(|m| m.id.as_str()).collect();
                error!(
                    "Could not fix broken triangle, still got matches != 3: {:?}",
                    names
                );
                continue;
            }
            for fixture in &mut group {
                fixture.triangle = id.clone();
            }
            match self.build(&id, &group) {
                Ok(triangle) => {
                    warn!("[{}] Repaired broken triangle.", id);
                    repaired.push(triangle);
                }
                Err(defect) => error!("[{}] Could not fix broken triangle: {}.", id, defect),
            }
        }
        repaired
    }
}
