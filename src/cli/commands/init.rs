//! Init command implementation.

use crate::core::config::Config;
use crate::launch;
use anyhow::Result;
use clap::Args;

/// Initialize the data environment.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Data directory override.
    #[arg(short, long)]
    pub data_dir: Option<String>,
}

/// Run the init command.
pub fn run_init(mut config: Config, args: InitArgs) -> Result<()> {
    if let Some(data_dir) = args.data_dir {
        config.paths.data_dir = data_dir;
        config.paths.db_path = None;
    }
    let created = launch::prepare_environment(&config)?;
    if created {
        println!(
            "Initialized data environment: {}",
            config.paths.db_path().display()
        );
    } else {
        println!(
            "Data environment already present: {}",
            config.paths.db_path().display()
        );
    }
    Ok(())
}
