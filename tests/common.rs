//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use bacex::storage::Store;
use std::io::Write;
use std::path::PathBuf;
use tempfile::{NamedTempFile, TempDir};

/// Create a minimal valid configuration file.
pub fn create_minimal_config() -> NamedTempFile {
    let config_content = r#"
[network]
port = 47808

[web]
bind = "127.0.0.1:8000"
"#;

    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(config_content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Create a configuration with custom settings.
pub fn create_config_with_settings(local_interface: &str, log_level: &str) -> NamedTempFile {
    let config_content = format!(
        r#"
[network]
local_interface = "{}"

[telemetry]
log_level = "{}"
"#,
        local_interface, log_level
    );

    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(config_content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Create an ensured store backed by a temp directory. The directory guard
/// must outlive the store.
pub fn create_temp_store() -> (TempDir, Store) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = Store::new(dir.path().join("bacnet_topology.db"));
    store.ensure().expect("Failed to initialize store");
    (dir, store)
}

/// Write an extraction map file into `dir` under the stored-map naming
/// convention, returning its path.
pub fn write_map_file(dir: &TempDir, project: &str, content: &str) -> PathBuf {
    let path = dir
        .path()
        .join(format!("extraction_map_{project}.csv"));
    std::fs::write(&path, content).expect("Failed to write map");
    path
}

/// A devices row ready for insertion.
pub fn sample_device(device_id: u32, address: &str) -> bacex::bacnet::DeviceInfo {
    bacex::bacnet::DeviceInfo {
        device_id,
        address: address.to_string(),
        max_apdu: Some(1476),
        segmentation: Some(bacex::bacnet::Segmentation::None),
        vendor_id: Some(260),
        vendor_name: Some("Acme Controls".to_string()),
        model_name: Some("AC-9".to_string()),
        firmware_rev: Some("4.2".to_string()),
        app_software: Some("9.1.0".to_string()),
    }
}
