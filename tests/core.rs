//! Core infrastructure tests.

mod common;

use bacex::core::config::{Config, ConfigOverrides};
use std::io::Write;
use tempfile::NamedTempFile;

// ============================================================================
// Config tests
// ============================================================================

#[test]
fn parse_minimal_config() {
    let file = common::create_minimal_config();
    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.network.port, 47808);
    assert_eq!(config.web.bind, "127.0.0.1:8000");
}

#[test]
fn empty_config_uses_defaults() {
    let config = Config::from_toml("").unwrap();
    assert_eq!(config.network.port, 47808);
    assert_eq!(config.network.sleep_between_ms, 100);
    assert_eq!(config.poller.default_interval_secs, 900);
    assert_eq!(config.ui.wait_secs, 30);
    assert_eq!(config.paths.data_dir, "data");
    assert_eq!(config.telemetry.log_level, "info");
}

#[test]
fn db_path_defaults_under_data_dir() {
    let config = Config::from_toml("[paths]\ndata_dir = \"var\"\n").unwrap();
    assert_eq!(
        config.paths.db_path(),
        std::path::Path::new("var").join("bacnet_topology.db")
    );

    let config = Config::from_toml("[paths]\ndb_path = \"elsewhere/t.db\"\n").unwrap();
    assert_eq!(
        config.paths.db_path(),
        std::path::PathBuf::from("elsewhere/t.db")
    );
}

#[test]
fn validate_rejects_bad_log_level() {
    let result = Config::from_toml("[telemetry]\nlog_level = \"loud\"\n");
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("log_level"));
}

#[test]
fn validate_rejects_bad_bind() {
    let result = Config::from_toml("[web]\nbind = \"not-an-addr\"\n");
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("bind"));
}

#[test]
fn validate_rejects_bad_interface_selector() {
    let result = Config::from_toml("[network]\nlocal_interface = \"office-lan\"\n");
    assert!(result.is_err());

    let ok = Config::from_toml("[network]\nlocal_interface = \"192.168.10.25/24\"\n");
    assert!(ok.is_ok());
}

#[test]
fn validate_rejects_zero_interval() {
    let result = Config::from_toml("[poller]\ndefault_interval_secs = 0\n");
    assert!(result.is_err());
}

#[test]
fn overrides_apply_after_load() {
    let file = common::create_minimal_config();
    let mut config = Config::from_file(file.path()).unwrap();
    config.apply_overrides(&ConfigOverrides {
        local_interface: Some("10.1.1.5/16".to_string()),
        port: Some(47812),
        db_path: Some("alt/topo.db".to_string()),
        log_level: Some("debug".to_string()),
        web_bind: Some("127.0.0.1:9000".to_string()),
    });
    assert_eq!(config.network.local_interface.as_deref(), Some("10.1.1.5/16"));
    assert_eq!(config.network.port, 47812);
    assert_eq!(config.paths.db_path().to_str(), Some("alt/topo.db"));
    assert_eq!(config.telemetry.log_level, "debug");
    assert_eq!(config.web.bind, "127.0.0.1:9000");
}

#[test]
fn load_or_default_requires_explicit_paths_to_exist() {
    let missing = std::path::Path::new("/definitely/not/here/bacex.toml");
    assert!(Config::load_or_default(missing, true).is_err());
    let config = Config::load_or_default(missing, false).unwrap();
    assert_eq!(config.network.port, 47808);
}

#[test]
fn unparseable_config_is_an_error() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"[network\nport=1").unwrap();
    assert!(Config::from_file(file.path()).is_err());
}

// ============================================================================
// Runtime tests
// ============================================================================

#[tokio::test]
async fn runtime_initializes_storage() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = Config::default();
    config.paths.data_dir = dir.path().join("data").display().to_string();

    let mut runtime = bacex::core::runtime::Runtime::new(config).unwrap();
    assert!(!runtime.is_running());

    runtime.start_for_tests().await.unwrap();
    assert!(runtime.is_running());
    assert!(runtime.config().paths.db_path().exists());
    assert!(runtime.state().is_some());

    runtime.shutdown_for_tests().await.unwrap();
    assert!(!runtime.is_running());
}

#[test]
fn runtime_rejects_invalid_config() {
    let config = Config {
        web: bacex::core::config::WebConfig {
            bind: "nope".to_string(),
        },
        ..Config::default()
    };
    assert!(bacex::core::runtime::Runtime::new(config).is_err());
}

#[test]
fn config_with_custom_settings_round_trips() {
    let file = common::create_config_with_settings("192.168.10.25/24", "debug");
    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(
        config.network.local_interface.as_deref(),
        Some("192.168.10.25/24")
    );
    assert_eq!(config.telemetry.log_level, "debug");
}
