//! Web and UI launch commands.

use crate::core::config::Config;
use crate::launch::{self, WebLaunchOptions};
use anyhow::Result;
use clap::Args;

/// Launch the web gateway.
#[derive(Args, Debug)]
pub struct WebArgs {
    /// Local IP or IP/CIDR to bind for BACnet traffic, exported as
    /// LOCAL_INTERFACE.
    #[arg(long)]
    pub local: Option<String>,

    /// Accepted for compatibility with the historical launch surface; has
    /// no effect.
    #[arg(long, hide = true)]
    pub open: bool,

    /// Do not open the browser before serving.
    #[arg(long)]
    pub no_browser: bool,
}

/// Launch the desktop-UI variant.
#[derive(Args, Debug)]
pub struct UiArgs {
    /// Local IP or IP/CIDR to bind for BACnet traffic, exported as
    /// LOCAL_INTERFACE.
    #[arg(long)]
    pub local: Option<String>,
}

/// Run the web launch command.
pub async fn run_web(config: Config, args: WebArgs) -> Result<()> {
    let options = WebLaunchOptions {
        local: args.local,
        open: args.open,
        no_browser: args.no_browser,
    };
    launch::run_web(config, &options).await
}

/// Run the UI launch command.
pub async fn run_ui(mut config: Config, args: UiArgs) -> Result<()> {
    if let Some(local) = args.local {
        launch::export_local_interface(Some(local.as_str()));
        config.network.local_interface = Some(local);
    }
    launch::run_ui(config).await
}
