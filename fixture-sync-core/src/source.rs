//! Fixture source seam.

use futures::stream::BoxStream;

use crate::error::SyncResult;
use crate::model::Match;
use crate::time::Time;

/// An upstream provider of matches.
///
/// Implementations yield a finite, lazily fetched stream containing only
/// matches whose start lies in `[from, until)`, already translated into
/// [`Time`] values by the run's [`crate::TimeSource`].
pub trait DataSource: Send + Sync {
    fn list_matches(&self, from: Time, until: Time) -> BoxStream<'_, SyncResult<Match>>;
}
