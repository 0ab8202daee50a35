mod config;
mod logging;
mod worker;

use std::path::PathBuf;

use anyhow::{Result, anyhow, bail};
use chrono::TimeDelta;
use clap::Parser;
use fixture_sync_core::TimeSource;
use tracing::{info, warn};

use crate::config::Config;
use crate::logging::{LogFormat, LogLevel};
use crate::worker::SyncWorker;

#[derive(Parser)]
#[command(name = "fixture-sync")]
#[command(about = "Sync league fixtures into Spond group events")]
struct Cli {
    /// Sync config file (defaults to ~/.config/fixture-sync/config.toml)
    config: Option<PathBuf>,

    /// Console log level
    #[arg(long, env = "LOG_LEVEL", value_enum, ignore_case = true, default_value = "warn")]
    log_level: LogLevel,

    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Time offset for source dates in days. Can be negative.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    source_offset: i64,

    /// Time offset for sink dates in days. Can be negative.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    sink_offset: i64,

    /// Only log sink changes instead of pushing them
    #[arg(long)]
    dry: bool,

    /// Perform the event sync (default)
    #[arg(long, overrides_with = "no_sync")]
    sync: bool,

    /// Skip the event sync
    #[arg(long, overrides_with = "sync")]
    no_sync: bool,

    /// Cancel all managed events of the season before syncing
    #[arg(long)]
    clean: bool,

    /// Assume yes for every confirmation
    #[arg(short, long)]
    yes: bool,

    /// Write the config back with defaults expanded
    #[arg(long)]
    update_config: bool,
}

impl Cli {
    fn sync_enabled(&self) -> bool {
        self.sync || !self.no_sync
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level.effective(cli.dry), cli.log_format)?;

    tokio::select! {
        result = run(cli) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, aborting.");
            Err(anyhow!("Interrupted"))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let path = match cli.config.clone() {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load(&path)?;
    let time_source = TimeSource::new(
        TimeDelta::days(cli.source_offset),
        TimeDelta::days(cli.sink_offset),
    );
    let worker = SyncWorker::new(&config, time_source, cli.dry)?;

    if cli.clean {
        worker.clean_group(cli.yes).await?;
    }

    let mut failed = None;
    if cli.sync_enabled() {
        let report = worker.sync_group().await?;
        if report.has_failures() {
            failed = Some(report);
        }
    }

    if cli.update_config {
        config.save(&path)?;
        info!("Updated {}.", path.display());
    }

    if let Some(report) = failed {
        bail!("Sync finished with failures: {}", report);
    }
    Ok(())
}
