//! Command-line interface.
//!
//! Unified CLI for bacex operations.

pub mod commands;

use clap::{Parser, Subcommand};

/// bacex - BACnet/IP discovery and extraction gateway.
#[derive(Parser, Debug)]
#[command(name = "bacex")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the web gateway in the foreground.
    Web(commands::WebArgs),
    /// Launch the desktop-UI variant (server plus hosting window).
    Ui(commands::UiArgs),
    /// Run one discovery sweep from the terminal.
    Discover(commands::DiscoverArgs),
    /// Run extraction polling from the terminal.
    Poll(commands::PollArgs),
    /// Initialize the data environment.
    Init(commands::InitArgs),
    /// Configuration operations.
    Config(commands::ConfigArgs),
    /// Show inventory and database status.
    Status(commands::StatusArgs),
}
