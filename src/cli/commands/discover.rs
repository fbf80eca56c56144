//! Discover command implementation.

use crate::bacnet::discovery::{self, CancelFlag, DiscoveryOptions, ProgressEvent};
use crate::core::config::Config;
use crate::storage::Store;
use anyhow::Result;
use clap::Args;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Run one discovery sweep.
#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Local IP/CIDR (e.g. 192.168.10.25/24). Defaults to all interfaces.
    #[arg(long)]
    pub local: Option<String>,

    /// Local UDP port. The conventional range is tried when busy.
    #[arg(long)]
    pub port: Option<u16>,

    /// Sleep between device queries, in seconds.
    #[arg(long)]
    pub sleep: Option<f64>,

    /// Also read presentValue once for common object types.
    #[arg(long)]
    pub snapshot_values: bool,
}

/// Run the discover command.
pub async fn run_discover(config: Config, args: DiscoverArgs) -> Result<()> {
    let options = DiscoveryOptions {
        local: args.local,
        port: args.port,
        sleep_ms: args.sleep.map(|secs| (secs * 1000.0) as u64),
        snapshot: args.snapshot_values,
    };

    let store = Store::new(config.paths.db_path());
    let cancel: CancelFlag = Arc::new(AtomicBool::new(false));

    let ctrlc_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("cancellation requested");
            ctrlc_cancel.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });

    discovery::run(&config.network, &options, &store, log_progress, &cancel).await?;
    Ok(())
}

fn log_progress(event: ProgressEvent) {
    match &event {
        ProgressEvent::PortSelected { port, tried } => {
            tracing::info!(port, ?tried, "local port selected");
        }
        ProgressEvent::WhoisComplete { total_devices, .. } => {
            tracing::info!(total_devices, "Who-Is sweep complete");
        }
        ProgressEvent::DeviceStart { device_id, address } => {
            tracing::info!(device_id, %address, "device");
        }
        ProgressEvent::DeviceError {
            device_id, error, ..
        } => {
            tracing::warn!(device_id, %error, "device failed");
        }
        ProgressEvent::DeviceObjects { device_id, count } => {
            tracing::info!(device_id, count, "objects saved");
        }
        ProgressEvent::DeviceSnapshot { device_id, count } => {
            tracing::info!(device_id, count, "snapshot saved");
        }
        ProgressEvent::Complete { db_path } => {
            tracing::info!(%db_path, "discovery complete");
        }
        _ => {}
    }
}
