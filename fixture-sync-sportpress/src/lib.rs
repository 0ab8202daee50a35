//! Fixture source backed by a SportsPress (WordPress) REST API.

mod client;
mod config;
mod source;
pub mod types;

pub use client::{EventFilter, SportpressClient};
pub use config::SportpressConfig;
pub use source::SportpressSource;
