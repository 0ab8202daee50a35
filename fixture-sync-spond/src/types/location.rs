use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A resolved Spond location.
///
/// Spond is inconsistent about `feature`/`featureName` and
/// `address`/`addressLine`, so both spellings are kept and read through
/// [`Location::feature`] and [`Location::address`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Location {
    pub fn feature(&self) -> Option<&str> {
        self.feature.as_deref().or(self.feature_name.as_deref())
    }

    pub fn address(&self) -> Option<&str> {
        self.address
            .as_deref()
            .or(self.address_line.as_deref())
            .or_else(|| self.feature())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Location(feature={}, address={})",
            self.feature().unwrap_or("-"),
            self.address().unwrap_or("-")
        )
    }
}

/// A candidate returned by `locations/autocomplete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutocompleteLocation {
    #[serde(rename = "placeId")]
    pub id: String,
    #[serde(rename = "featureName")]
    pub name: String,
    #[serde(default)]
    pub address_line: Option<String>,
}

impl fmt::Display for AutocompleteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AutocompleteLocation(id={}, name={})", self.id, self.name)
    }
}
