//! Triangle building and reconciliation against a sink.

mod obligations;
mod sync_report;
mod sync_service;
mod triangle_builder;

pub use sync_report::SyncReport;
pub use sync_service::SyncService;
pub use triangle_builder::{TriangleBuilder, TriangleDefect};
