use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Configuration of the VolleyZone source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolleyZoneConfig {
    /// League pages to scrape, keyed by a display name.
    pub leagues: IndexMap<String, String>,
    /// Full addresses keyed by a venue prefix as printed on the league page.
    ///
    /// The first key that prefixes a venue wins, so more specific prefixes
    /// belong first.
    #[serde(default)]
    pub addresses: IndexMap<String, String>,
}
