//! Entry-point launch sequences.
//!
//! The web and desktop-UI variants share one bootstrap path: resolve the
//! repository root so relative paths behave the same from any calling
//! directory, prepare the data environment (directory plus database
//! schema) if it does not exist yet, export the interface selector for the
//! downstream engines, and only then start the entry point in the
//! foreground. Every step is fail-fast: the entry point never starts after
//! a failed step.
//!
//! The web variant opens the system browser at the fixed local address
//! before serving unless suppressed; the UI variant starts the server in
//! the background, waits for it to accept connections, then opens its
//! hosting window.

use crate::core::config::{Config, ENV_LOCAL_INTERFACE};
use crate::core::error::{BacexError, BacexResult};
use crate::core::runtime::Runtime;
use crate::storage::Store;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};

/// The fixed local address the web variant opens in the browser.
pub const FIXED_LOCAL_URL: &str = "http://127.0.0.1:8000";

/// Launch parameters for the web variant.
#[derive(Debug, Clone, Default)]
pub struct WebLaunchOptions {
    /// Interface selector, exported as `LOCAL_INTERFACE`.
    pub local: Option<String>,
    /// Accepted for compatibility with the historical launch surface;
    /// has no effect.
    pub open: bool,
    /// Suppress the automatic browser launch.
    pub no_browser: bool,
}

impl WebLaunchOptions {
    /// The URL to open before serving, or `None` when suppressed.
    pub fn browser_target(&self) -> Option<&'static str> {
        if self.no_browser {
            None
        } else {
            Some(FIXED_LOCAL_URL)
        }
    }
}

/// Walk up from `start` to the repository root, identified by its
/// manifest.
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        if dir.join("Cargo.toml").exists() {
            return Some(dir);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Change into the repository root, regardless of the caller's working
/// directory. Falls back to the current directory when no root marker is
/// found (e.g. an installed binary run outside a checkout).
pub fn enter_repo_root() -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let root = match find_repo_root(&cwd) {
        Some(root) => root,
        None => {
            tracing::debug!(cwd = %cwd.display(), "no repository root marker; staying put");
            return Ok(cwd);
        }
    };
    if root != cwd {
        std::env::set_current_dir(&root)
            .with_context(|| format!("cannot enter repository root {}", root.display()))?;
        tracing::debug!(root = %root.display(), "entered repository root");
    }
    Ok(root)
}

/// Prepare the data environment: create the data directory and apply the
/// database schema when absent; reuse it untouched when present.
///
/// Returns `true` when the environment was created on this call.
pub fn prepare_environment(config: &Config) -> BacexResult<bool> {
    let store = Store::new(config.paths.db_path());
    let created = !store.exists();
    std::fs::create_dir_all(config.paths.data_dir())?;
    store.ensure()?;
    if created {
        tracing::info!(
            db_path = %config.paths.db_path().display(),
            "data environment created"
        );
    } else {
        tracing::debug!("data environment already present");
    }
    Ok(created)
}

/// Export the interface selector for the process and its engines.
pub fn export_local_interface(local: Option<&str>) {
    if let Some(local) = local {
        std::env::set_var(ENV_LOCAL_INTERFACE, local);
        tracing::debug!(%local, "interface selector exported");
    }
}

/// Open the default system browser at `url`.
pub fn open_browser(url: &str) -> BacexResult<()> {
    let result = {
        #[cfg(target_os = "linux")]
        {
            std::process::Command::new("xdg-open").arg(url).spawn()
        }
        #[cfg(target_os = "macos")]
        {
            std::process::Command::new("open").arg(url).spawn()
        }
        #[cfg(target_os = "windows")]
        {
            std::process::Command::new("cmd")
                .args(["/C", "start", "", url])
                .spawn()
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "no system browser opener on this platform",
            ))
        }
    };
    result.map_err(|e| BacexError::LaunchFailed {
        step: "open-browser",
        reason: e.to_string(),
    })?;
    tracing::info!(%url, "opened system browser");
    Ok(())
}

/// Poll `host:port` until it accepts a TCP connection or `wait` elapses.
pub async fn wait_for_server(host: &str, port: u16, wait: Duration) -> BacexResult<()> {
    let deadline = Instant::now() + wait;
    let target = format!("{host}:{port}");
    while Instant::now() < deadline {
        if let Ok(Ok(_stream)) =
            timeout(Duration::from_secs(2), TcpStream::connect(&target)).await
        {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    Err(BacexError::UiStartTimeout {
        url: format!("http://{target}"),
        timeout_secs: wait.as_secs(),
    })
}

/// Launch the web variant: bootstrap, optionally open the browser at the
/// fixed local address, then serve in the foreground until shutdown.
pub async fn run_web(config: Config, options: &WebLaunchOptions) -> Result<()> {
    let mut config = config;
    if let Some(ref local) = options.local {
        config.network.local_interface = Some(local.clone());
    }

    prepare_environment(&config).context("failed to prepare data environment")?;
    export_local_interface(options.local.as_deref());

    let mut runtime = Runtime::new(config)?;

    if let Some(url) = options.browser_target() {
        open_browser(url).context("failed to open browser")?;
    }

    runtime.run().await
}

/// Launch the desktop-UI variant: serve in the background, wait for the
/// server to come up, open the hosting window, and keep serving until
/// shutdown.
pub async fn run_ui(config: Config) -> Result<()> {
    prepare_environment(&config).context("failed to prepare data environment")?;

    let host = config.ui.host.clone();
    let port = config.ui.port;
    let wait = Duration::from_secs(config.ui.wait_secs);
    let title = config.ui.title.clone();

    let mut runtime = Runtime::for_ui(config)?;
    runtime.start().await?;

    let url = format!("http://{host}:{port}");
    if let Err(e) = wait_for_server(&host, port, wait).await {
        runtime.stop().await?;
        return Err(e.into());
    }

    tracing::info!(%title, %url, "hosting UI window");
    open_browser(&url).context("failed to open UI window")?;

    runtime.wait().await;
    runtime.stop().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_suppression() {
        let open = WebLaunchOptions::default();
        assert_eq!(open.browser_target(), Some(FIXED_LOCAL_URL));

        let suppressed = WebLaunchOptions {
            no_browser: true,
            ..WebLaunchOptions::default()
        };
        assert_eq!(suppressed.browser_target(), None);
    }

    #[test]
    fn inert_open_flag_changes_nothing() {
        let with_open = WebLaunchOptions {
            open: true,
            ..WebLaunchOptions::default()
        };
        assert_eq!(with_open.browser_target(), Some(FIXED_LOCAL_URL));
    }

    #[test]
    fn repo_root_is_found_from_nested_directories() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("repo");
        let nested = root.join("src").join("deep");
        std::fs::create_dir_all(&nested).expect("mkdirs");
        std::fs::write(root.join("Cargo.toml"), "[package]\n").expect("manifest");

        let found = find_repo_root(&nested).expect("root");
        assert_eq!(found, root);
    }

    #[test]
    fn missing_root_marker_yields_none() {
        let tmp = tempfile::tempdir().expect("tempdir");
        assert_eq!(find_repo_root(tmp.path()), None);
    }
}
