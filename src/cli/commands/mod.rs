//! CLI command implementations.

mod config;
mod discover;
mod init;
mod launch;
mod poll;
mod status;

pub use config::{run_config, ConfigArgs};
pub use discover::{run_discover, DiscoverArgs};
pub use init::{run_init, InitArgs};
pub use launch::{run_ui, run_web, UiArgs, WebArgs};
pub use poll::{run_poll, PollArgs};
pub use status::{run_status, StatusArgs};
