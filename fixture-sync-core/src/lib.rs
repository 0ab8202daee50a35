//! Core types for fixture-sync.
//!
//! This crate holds everything that does not depend on a concrete fixture
//! provider or calendar service:
//! - `time` for the runtime/source/sink time domains
//! - `model` for matches, teams and triangles
//! - `source` / `sink` for the provider seams
//! - `sync` for the triangle builder and the reconciliation engine

pub mod constants;
pub mod error;
pub mod model;
pub mod serde_util;
pub mod single_flight;
pub mod sink;
pub mod source;
pub mod sync;
pub mod time;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{SyncError, SyncResult};
pub use model::*;
pub use sink::{DataSink, LogSink, SinkOutcome};
pub use source::DataSource;
pub use sync::{SyncReport, SyncService, TriangleBuilder, TriangleDefect};
pub use time::{Time, TimeSource};
