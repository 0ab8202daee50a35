//! The sync configuration file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use fixture_sync_core::TeamId;
use fixture_sync_sportpress::SportpressConfig;
use fixture_sync_spond::SpondSinkConfig;
use fixture_sync_volleyzone::VolleyZoneConfig;
use serde::{Deserialize, Serialize};

/// Configuration at ~/.config/fixture-sync/config.toml unless given on the
/// command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    pub source: SourceConfig,
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Regroup matches of broken triangles by start time and venue.
    pub repair_broken_triangles: bool,
    /// Month the season starts in, on its 1st at midnight UTC.
    pub season_start_month: u32,
    pub season_length_days: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            repair_broken_triangles: false,
            season_start_month: 8,
            season_length_days: 365,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum SourceConfig {
    Volleyzone(VolleyZoneConfig),
    Sportpress(SportpressConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum SinkConfig {
    Spond(SpondSinkConfig),
    /// Logs what would be written instead of writing anywhere.
    Log(LogSinkConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSinkConfig {
    pub teams: Vec<TeamId>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
            .join("fixture-sync");

        Ok(config_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Config file {} does not exist", path.display());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Writes the config back with every default spelled out.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }
}
