//! Spond calendar sink for fixture-sync.
//!
//! [`SpondClient`] talks to the Spond core API, [`EventBuilder`] turns a
//! match into a Spond event and [`SpondSink`] ties both to the
//! [`fixture_sync_core::DataSink`] seam.

mod api;
mod client;
mod config;
mod error;
mod event_builder;
mod location;
mod sink;
pub mod types;

#[cfg(test)]
mod fake;

pub use api::{EventQuery, SpondApi};
pub use client::SpondClient;
pub use config::{EventsConfig, SpondCredentials, SpondSinkConfig};
pub use error::{SpondError, SpondResult};
pub use event_builder::EventBuilder;
pub use location::LocationService;
pub use sink::SpondSink;
