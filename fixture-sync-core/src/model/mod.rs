//! Source-neutral fixture types.
//!
//! Sources convert whatever they scrape or fetch into these types, and the
//! reconciliation engine and sinks work exclusively with them.

mod fixture;
mod team;
mod triangle;
mod venue;

pub use fixture::{Match, MatchId, MatchResult, TeamResult};
pub use team::{Team, TeamId};
pub use triangle::{Triangle, TriangleId};
pub use venue::Venue;
