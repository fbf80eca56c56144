//! Status command implementation.

use crate::core::config::Config;
use crate::storage::Store;
use anyhow::Result;
use clap::Args;
use serde::Serialize;

/// Show inventory and database status.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output format (text, json).
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(Debug, Serialize)]
struct StatusSummary {
    db_path: String,
    db_present: bool,
    devices: usize,
    objects: usize,
    samples: usize,
    last_seen_utc: Option<String>,
}

/// Run the status command.
pub fn run_status(config: Config, args: StatusArgs) -> Result<()> {
    let store = Store::new(config.paths.db_path());
    let summary = summarize(&store)?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => {
            println!("bacex inventory status");
            println!("======================");
            println!("Database:   {}", summary.db_path);
            if !summary.db_present {
                println!("  (not initialized; run `bacex init`)");
                return Ok(());
            }
            println!("Devices:    {}", summary.devices);
            println!("Objects:    {}", summary.objects);
            println!("Samples:    {}", summary.samples);
            if let Some(last_seen) = &summary.last_seen_utc {
                println!("Last seen:  {last_seen}");
            }
        }
    }
    Ok(())
}

fn summarize(store: &Store) -> Result<StatusSummary> {
    let db_path = store.path().display().to_string();
    if !store.exists() {
        return Ok(StatusSummary {
            db_path,
            db_present: false,
            devices: 0,
            objects: 0,
            samples: 0,
            last_seen_utc: None,
        });
    }

    let devices = store.devices()?;
    let objects = store.points(None)?;
    let samples = store.samples(None, None)?;
    let last_seen_utc = devices
        .iter()
        .map(|d| d.last_seen_utc.clone())
        .max();

    Ok(StatusSummary {
        db_path,
        db_present: true,
        devices: devices.len(),
        objects: objects.len(),
        samples: samples.len(),
        last_seen_utc,
    })
}
