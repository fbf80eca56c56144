//! bacex - unified CLI entrypoint.
//!
//! Usage:
//!   bacex web [--local 192.168.10.25/24] [--no-browser]
//!   bacex ui
//!   bacex discover [--local ...] [--port 47808] [--snapshot-values]
//!   bacex poll [--map data/extraction_map_plant.csv] [--loop]
//!   bacex init
//!   bacex config validate --config config/bacex.toml
//!   bacex status [--format json]

use anyhow::Result;
use bacex::cli::commands::{
    run_config, run_discover, run_init, run_poll, run_status, run_ui, run_web,
};
use bacex::cli::{Cli, Commands};
use bacex::core::config::{Config, ConfigOverrides};
use bacex::launch::enter_repo_root;
use bacex::ops::telemetry::init_tracing;
use clap::Parser;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Relative paths (config file, data directory) resolve against the
    // repository root no matter where the command was invoked from.
    enter_repo_root()?;

    let explicit_config = cli.config.is_some();
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    let mut config = Config::load_or_default(&config_path, explicit_config)?;
    config.apply_env();
    config.apply_overrides(&ConfigOverrides {
        log_level: cli.log_level,
        ..ConfigOverrides::default()
    });
    config.validate()?;

    init_tracing(&config.telemetry.log_level);

    match cli.command {
        Commands::Web(args) => run_web(config, args).await,
        Commands::Ui(args) => run_ui(config, args).await,
        Commands::Discover(args) => run_discover(config, args).await,
        Commands::Poll(args) => run_poll(config, args).await,
        Commands::Init(args) => run_init(config, args),
        Commands::Config(args) => run_config(args),
        Commands::Status(args) => run_status(config, args),
    }
}
