//! Fixture source scraping VolleyZone league pages.
//!
//! Each configured league page carries a fixtures table for upcoming
//! matches and a results table for played ones. Both are read on every
//! listing; nothing is cached between runs.

mod config;
mod parser;
mod source;

pub use config::VolleyZoneConfig;
pub use source::VolleyZoneSource;
