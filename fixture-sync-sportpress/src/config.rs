use serde::{Deserialize, Serialize};

/// Configuration of the SportsPress source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SportpressConfig {
    /// Base of the SportsPress REST namespace, e.g. `https://club.example/wp-json/sportspress/v2`.
    pub api_url: String,
    /// Basic auth user, for sites that hide their API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Names of the source teams whose matches are listed.
    pub teams: Vec<String>,
}
