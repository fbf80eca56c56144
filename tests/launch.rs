//! Launch sequence tests: environment preparation, interface export,
//! browser suppression, readiness polling, and fail-fast ordering.

mod common;

use bacex::core::config::{Config, ENV_LOCAL_INTERFACE};
use bacex::core::error::BacexError;
use bacex::launch::{
    self, find_repo_root, prepare_environment, wait_for_server, WebLaunchOptions,
    FIXED_LOCAL_URL,
};
use bacex::storage::Store;
use std::time::Duration;

fn config_in(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.paths.data_dir = dir.path().join("data").display().to_string();
    config.paths.db_path = None;
    config
}

#[test]
fn environment_is_created_once_and_reused() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = config_in(&dir);

    // First run creates the environment.
    assert!(prepare_environment(&config).unwrap());
    assert!(config.paths.db_path().exists());

    // Seed a row, then re-run: creation is skipped and data survives.
    let store = Store::new(config.paths.db_path());
    store
        .upsert_device(&common::sample_device(5, "10.0.0.5:47808"), "t1")
        .unwrap();

    assert!(!prepare_environment(&config).unwrap());
    assert_eq!(store.devices().unwrap().len(), 1);
}

#[test]
fn environment_failure_is_fail_fast() {
    let dir = tempfile::TempDir::new().unwrap();
    // A file where the data directory should be makes creation fail.
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let mut config = Config::default();
    config.paths.data_dir = blocker.join("data").display().to_string();

    assert!(prepare_environment(&config).is_err());
}

#[tokio::test]
async fn web_launch_aborts_before_serving_when_environment_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let mut config = Config::default();
    config.paths.data_dir = blocker.join("data").display().to_string();

    let options = WebLaunchOptions {
        no_browser: true,
        ..WebLaunchOptions::default()
    };
    let result = launch::run_web(config, &options).await;
    let message = format!("{:#}", result.expect_err("launch must fail"));
    assert!(message.contains("data environment"));
}

#[test]
fn local_interface_is_exported_verbatim() {
    launch::export_local_interface(Some("192.168.10.25/24"));
    assert_eq!(
        std::env::var(ENV_LOCAL_INTERFACE).as_deref(),
        Ok("192.168.10.25/24")
    );

    // The exported value flows into a freshly loaded configuration the
    // same way the launch scripts handed it to the application.
    let mut config = Config::default();
    config.apply_env();
    assert_eq!(
        config.network.local_interface.as_deref(),
        Some("192.168.10.25/24")
    );
}

#[test]
fn browser_opens_at_the_fixed_address_unless_suppressed() {
    let defaults = WebLaunchOptions::default();
    assert_eq!(defaults.browser_target(), Some(FIXED_LOCAL_URL));
    assert_eq!(FIXED_LOCAL_URL, "http://127.0.0.1:8000");

    let suppressed = WebLaunchOptions {
        no_browser: true,
        ..WebLaunchOptions::default()
    };
    assert_eq!(suppressed.browser_target(), None);

    // The historical Open switch changes nothing either way.
    let inert = WebLaunchOptions {
        open: true,
        no_browser: true,
        ..WebLaunchOptions::default()
    };
    assert_eq!(inert.browser_target(), None);
}

#[test]
fn repo_root_resolution_is_caller_independent() {
    let tmp = tempfile::TempDir::new().unwrap();
    let root = tmp.path().join("checkout");
    std::fs::create_dir_all(root.join("src/bacnet/codec")).unwrap();
    std::fs::write(root.join("Cargo.toml"), "[package]\n").unwrap();

    for nested in ["src", "src/bacnet", "src/bacnet/codec"] {
        assert_eq!(
            find_repo_root(&root.join(nested)).as_deref(),
            Some(root.as_path())
        );
    }
    assert_eq!(find_repo_root(&root).as_deref(), Some(root.as_path()));
}

#[tokio::test]
async fn readiness_poll_succeeds_against_a_listening_server() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let accept = tokio::spawn(async move {
        let _ = listener.accept().await;
    });

    wait_for_server("127.0.0.1", port, Duration::from_secs(5))
        .await
        .expect("server is listening");
    accept.abort();
}

#[tokio::test]
async fn readiness_poll_times_out_with_a_named_url() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener); // free the port so nothing is listening

    let result = wait_for_server("127.0.0.1", port, Duration::from_secs(1)).await;
    match result {
        Err(BacexError::UiStartTimeout { url, timeout_secs }) => {
            assert!(url.contains(&port.to_string()));
            assert_eq!(timeout_secs, 1);
        }
        other => panic!("expected UiStartTimeout, got {other:?}"),
    }
}
