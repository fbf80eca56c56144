//! Config command implementation.

use crate::core::config::Config;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate a configuration file.
    Validate {
        /// Config file path.
        #[arg(short, long, default_value = "config/bacex.toml")]
        config: PathBuf,
    },
    /// Print the effective configuration with defaults filled in.
    Show {
        /// Config file path.
        #[arg(short, long, default_value = "config/bacex.toml")]
        config: PathBuf,
        /// Output format (toml, json).
        #[arg(long, default_value = "toml")]
        format: String,
    },
}

/// Run the config command.
pub fn run_config(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Validate { config } => validate_config(&config),
        ConfigCommand::Show { config, format } => show_config(&config, &format),
    }
}

fn validate_config(path: &PathBuf) -> Result<()> {
    Config::from_file(path)
        .with_context(|| format!("configuration invalid: {}", path.display()))?;
    println!("Configuration valid: {}", path.display());
    Ok(())
}

fn show_config(path: &PathBuf, format: &str) -> Result<()> {
    let config = Config::load_or_default(path, false)?;
    let rendered = match format {
        "json" => serde_json::to_string_pretty(&config)?,
        _ => toml::to_string_pretty(&config)?,
    };
    println!("{rendered}");
    Ok(())
}
