//! Error types for fixture-sync.

use thiserror::Error;

/// Errors that can occur while synchronising fixtures.
///
/// Only [`SyncError::Precondition`] aborts a run; everything else is
/// isolated to the unit that produced it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fixture source error: {0}")]
    Source(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Data quality defect: {0}")]
    DataQuality(String),
}

impl SyncError {
    /// Whether the error leaves no meaningful partial result and must end the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Precondition(_))
    }
}

/// Result type alias for fixture-sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
