//! Poll command implementation.

use crate::bacnet::discovery::DiscoveryOptions;
use crate::bacnet::map;
use crate::bacnet::poller::{self, PollEvent};
use crate::core::config::Config;
use crate::core::error::BacexError;
use crate::storage::Store;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Run extraction polling.
#[derive(Args, Debug)]
pub struct PollArgs {
    /// Extraction map CSV path. Defaults to the project's stored map.
    #[arg(long)]
    pub map: Option<PathBuf>,

    /// Project name whose stored map should be polled.
    #[arg(long)]
    pub project: Option<String>,

    /// Seconds between cycles when looping.
    #[arg(long)]
    pub interval: Option<u64>,

    /// Local IP/CIDR for the BACnet socket.
    #[arg(long)]
    pub local: Option<String>,

    /// Local UDP port. The conventional range is tried when busy.
    #[arg(long)]
    pub port: Option<u16>,

    /// Keep polling on the interval instead of running one cycle.
    #[arg(long = "loop")]
    pub run_loop: bool,
}

/// Run the poll command.
pub async fn run_poll(config: Config, args: PollArgs) -> Result<()> {
    let map_path = resolve_map(&config, args.map, args.project.as_deref())?;
    tracing::info!(map = %map_path.display(), "polling extraction map");

    let options = DiscoveryOptions {
        local: args.local,
        port: args.port,
        ..DiscoveryOptions::default()
    };
    let net = options.effective(&config.network);
    let store = Store::new(config.paths.db_path());

    if args.run_loop {
        let interval = Duration::from_secs(
            args.interval.unwrap_or(config.poller.default_interval_secs),
        );
        let cancel = Arc::new(AtomicBool::new(false));
        let ctrlc_cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("cancellation requested");
                ctrlc_cancel.store(true, std::sync::atomic::Ordering::Relaxed);
            }
        });
        poller::run_loop(&net, &map_path, interval, &store, log_progress, &cancel).await;
    } else {
        let entries = map::read_map_file(&map_path)?;
        let stats = poller::run_once(&net, &entries, &store, log_progress).await?;
        tracing::info!(
            points = stats.points,
            read = stats.read,
            errors = stats.errors,
            "poll cycle finished"
        );
    }
    Ok(())
}

fn resolve_map(
    config: &Config,
    explicit: Option<PathBuf>,
    project: Option<&str>,
) -> Result<PathBuf> {
    if let Some(path) = explicit {
        anyhow::ensure!(path.exists(), "extraction map not found: {}", path.display());
        return Ok(path);
    }
    let data_dir = config.paths.data_dir();
    if let Some(project) = project {
        let path = map::map_path(&data_dir, &map::sanitize_project(project));
        anyhow::ensure!(
            path.exists(),
            "no stored map for project '{project}' (expected {})",
            path.display()
        );
        return Ok(path);
    }
    map::list_map_files(&data_dir)
        .into_iter()
        .next()
        .ok_or_else(|| BacexError::MapNotFound { project: None })
        .context("pass --map or store a map under the data directory first")
}

fn log_progress(event: PollEvent) {
    match &event {
        PollEvent::PollPortSelected { port, tried } => {
            tracing::info!(port, ?tried, "local port selected");
        }
        PollEvent::PollCycleStart { points } => {
            tracing::info!(points, "poll cycle started");
        }
        PollEvent::PollCycleDone {
            points,
            read,
            errors,
        } => {
            tracing::info!(points, read, errors, "poll cycle done");
        }
        PollEvent::PollCycleError { error } => {
            tracing::warn!(%error, "poll cycle failed");
        }
    }
}
