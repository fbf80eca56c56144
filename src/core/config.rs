//! Configuration parsing and validation.
//!
//! bacex configuration is loaded from TOML files with CLI and environment
//! overrides. Every section defaults, so the gateway starts with no config
//! file at all; an explicitly supplied path that does not exist is an error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable selecting the local network interface.
pub const ENV_LOCAL_INTERFACE: &str = "LOCAL_INTERFACE";
/// Environment variable overriding the database path.
pub const ENV_DB_PATH: &str = "DB_PATH";
/// Environment variable overriding the default poll interval in seconds.
pub const ENV_DEFAULT_INTERVAL: &str = "DEFAULT_INTERVAL_SEC";

/// Top-level bacex configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// BACnet/IP network configuration.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Web gateway configuration.
    #[serde(default)]
    pub web: WebConfig,

    /// Extraction poller configuration.
    #[serde(default)]
    pub poller: PollerConfig,

    /// Desktop-UI entry point configuration.
    #[serde(default)]
    pub ui: UiConfig,

    /// Filesystem paths.
    #[serde(default)]
    pub paths: PathConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// BACnet/IP network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Local IP or IP/CIDR to bind (e.g. "192.168.10.25/24"). When absent
    /// the socket binds all interfaces.
    #[serde(default)]
    pub local_interface: Option<String>,

    /// Preferred local UDP port. Ports up to the end of the conventional
    /// BACnet range are tried when this one is busy.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Delay between per-device queries during discovery, in milliseconds.
    #[serde(default = "default_sleep_between_ms")]
    pub sleep_between_ms: u64,

    /// Listen window for I-Am replies after a Who-Is broadcast, in
    /// milliseconds.
    #[serde(default = "default_whois_window_ms")]
    pub whois_window_ms: u64,

    /// Per-request response timeout for confirmed services, in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Confirmed-request retry budget (attempts = retries + 1).
    #[serde(default = "default_read_retries")]
    pub read_retries: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            local_interface: None,
            port: default_port(),
            sleep_between_ms: default_sleep_between_ms(),
            whois_window_ms: default_whois_window_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            read_retries: default_read_retries(),
        }
    }
}

/// Web gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// HTTP bind address.
    #[serde(default = "default_web_bind")]
    pub bind: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: default_web_bind(),
        }
    }
}

/// Extraction poller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Default interval between poll cycles, in seconds.
    #[serde(default = "default_interval_secs")]
    pub default_interval_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: default_interval_secs(),
        }
    }
}

/// Desktop-UI entry point configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// Host the embedded server binds for the UI.
    #[serde(default = "default_ui_host")]
    pub host: String,

    /// Port the embedded server binds for the UI.
    #[serde(default = "default_ui_port")]
    pub port: u16,

    /// Seconds to wait for the embedded server before giving up.
    #[serde(default = "default_ui_wait_secs")]
    pub wait_secs: u64,

    /// Window title, used for logging.
    #[serde(default = "default_ui_title")]
    pub title: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            host: default_ui_host(),
            port: default_ui_port(),
            wait_secs: default_ui_wait_secs(),
            title: default_ui_title(),
        }
    }
}

/// Filesystem path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Data directory holding the database and extraction maps.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Database path. Defaults to `<data_dir>/bacnet_topology.db`.
    #[serde(default)]
    pub db_path: Option<String>,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_path: None,
        }
    }
}

impl PathConfig {
    /// Resolved database path.
    pub fn db_path(&self) -> PathBuf {
        match &self.db_path {
            Some(p) => PathBuf::from(p),
            None => Path::new(&self.data_dir).join("bacnet_topology.db"),
        }
    }

    /// Resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// Default value functions

fn default_port() -> u16 {
    47808
}

fn default_sleep_between_ms() -> u64 {
    100
}

fn default_whois_window_ms() -> u64 {
    3_000
}

fn default_read_timeout_ms() -> u64 {
    3_000
}

fn default_read_retries() -> u32 {
    2
}

fn default_web_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_interval_secs() -> u64 {
    900
}

fn default_ui_host() -> String {
    "127.0.0.1".to_string()
}

fn default_ui_port() -> u16 {
    8000
}

fn default_ui_wait_secs() -> u64 {
    30
}

fn default_ui_title() -> String {
    "Triton Edge Data Gateway".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Default config file location relative to the repository root.
    pub fn default_path() -> PathBuf {
        PathBuf::from("config/bacex.toml")
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file at `path` when it exists, otherwise fall back to
    /// defaults. `explicit` marks a user-supplied path, which must exist.
    pub fn load_or_default(path: &Path, explicit: bool) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else if explicit {
            anyhow::bail!("config file not found: {}", path.display());
        } else {
            Ok(Self::default())
        }
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref local) = overrides.local_interface {
            self.network.local_interface = Some(local.clone());
        }
        if let Some(port) = overrides.port {
            self.network.port = port;
        }
        if let Some(ref db_path) = overrides.db_path {
            self.paths.db_path = Some(db_path.clone());
        }
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(ref bind) = overrides.web_bind {
            self.web.bind = bind.clone();
        }
    }

    /// Apply process-environment overrides. These are the variables the
    /// launch surface exports for the application.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var(ENV_LOCAL_INTERFACE) {
            if !v.trim().is_empty() {
                self.network.local_interface = Some(v);
            }
        }
        if let Ok(v) = std::env::var(ENV_DB_PATH) {
            if !v.trim().is_empty() {
                self.paths.db_path = Some(v);
            }
        }
        if let Ok(v) = std::env::var(ENV_DEFAULT_INTERVAL) {
            if let Ok(secs) = v.trim().parse::<u64>() {
                self.poller.default_interval_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("BACEX_UI_HOST") {
            if !v.trim().is_empty() {
                self.ui.host = v;
            }
        }
        if let Ok(v) = std::env::var("BACEX_UI_PORT") {
            if let Ok(port) = v.trim().parse::<u16>() {
                self.ui.port = port;
            }
        }
        if let Ok(v) = std::env::var("BACEX_UI_WAIT") {
            if let Ok(secs) = v.trim().parse::<u64>() {
                self.ui.wait_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("BACEX_UI_TITLE") {
            if !v.trim().is_empty() {
                self.ui.title = v;
            }
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_network()?;
        self.validate_web()?;
        self.validate_poller()?;
        self.validate_ui()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_network(&self) -> Result<()> {
        if self.network.port == 0 {
            anyhow::bail!("network.port must be > 0");
        }
        if self.network.whois_window_ms == 0 {
            anyhow::bail!("network.whois_window_ms must be > 0");
        }
        if self.network.read_timeout_ms == 0 {
            anyhow::bail!("network.read_timeout_ms must be > 0");
        }
        if let Some(ref local) = self.network.local_interface {
            let addr = local.split('/').next().unwrap_or(local);
            if addr.parse::<std::net::IpAddr>().is_err() {
                anyhow::bail!(
                    "network.local_interface must be an IP or IP/CIDR, got: {}",
                    local
                );
            }
        }
        Ok(())
    }

    fn validate_web(&self) -> Result<()> {
        if self.web.bind.parse::<std::net::SocketAddr>().is_err() {
            anyhow::bail!("web.bind must be a socket address, got: {}", self.web.bind);
        }
        Ok(())
    }

    fn validate_poller(&self) -> Result<()> {
        if self.poller.default_interval_secs == 0 {
            anyhow::bail!("poller.default_interval_secs must be > 0");
        }
        Ok(())
    }

    fn validate_ui(&self) -> Result<()> {
        if self.ui.port == 0 {
            anyhow::bail!("ui.port must be > 0");
        }
        if self.ui.wait_secs == 0 {
            anyhow::bail!("ui.wait_secs must be > 0");
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override the local interface selector.
    pub local_interface: Option<String>,
    /// Override the preferred BACnet port.
    pub port: Option<u16>,
    /// Override the database path.
    pub db_path: Option<String>,
    /// Override the log level.
    pub log_level: Option<String>,
    /// Override the web bind address.
    pub web_bind: Option<String>,
}
