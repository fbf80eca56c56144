//! Gateway runtime orchestration.
//!
//! The runtime coordinates component lifecycle:
//! - Start order: storage → worker controllers → web listener
//! - Shutdown order: web listener → worker controllers → storage

use crate::core::config::Config;
use crate::web::workers::STOP_WAIT;
use crate::web::{server, AppState};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Component health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    /// Component is starting.
    Starting,
    /// Component is healthy and operational.
    Healthy,
    /// Component has failed.
    Failed,
    /// Component is stopping.
    Stopping,
    /// Component has stopped.
    Stopped,
}

/// Health status aggregated from all components.
#[derive(Debug, Clone)]
pub struct RuntimeHealth {
    /// Storage layer health.
    pub storage: ComponentHealth,
    /// Worker controller health.
    pub workers: ComponentHealth,
    /// Web listener health.
    pub listener: ComponentHealth,
}

impl Default for RuntimeHealth {
    fn default() -> Self {
        Self {
            storage: ComponentHealth::Starting,
            workers: ComponentHealth::Starting,
            listener: ComponentHealth::Starting,
        }
    }
}

impl RuntimeHealth {
    /// Check if the runtime is ready to serve requests.
    pub fn is_ready(&self) -> bool {
        matches!(
            (self.storage, self.workers, self.listener),
            (
                ComponentHealth::Healthy,
                ComponentHealth::Healthy,
                ComponentHealth::Healthy
            )
        )
    }
}

/// Gateway runtime holding all component handles.
pub struct Runtime {
    /// Configuration.
    config: Arc<Config>,

    /// Web bind address.
    bind: SocketAddr,

    /// Shared application state, populated by [`Runtime::start`].
    state: Option<AppState>,

    /// Runtime health status.
    health: RuntimeHealth,

    /// Whether the runtime is running.
    running: Arc<AtomicBool>,

    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,

    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,

    /// Web server task handle.
    server_handle: Option<JoinHandle<Result<()>>>,
}

impl Runtime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let bind: SocketAddr = config
            .web
            .bind
            .parse()
            .context("invalid web bind address")?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            bind,
            state: None,
            health: RuntimeHealth::default(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            shutdown_rx,
            server_handle: None,
        })
    }

    /// Create a runtime that binds the UI host/port instead of `web.bind`.
    pub fn for_ui(mut config: Config) -> Result<Self> {
        config.web.bind = format!("{}:{}", config.ui.host, config.ui.port);
        Self::new(config)
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The web bind address.
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind
    }

    /// Get the shared application state (after [`Runtime::start`]).
    pub fn state(&self) -> Option<&AppState> {
        self.state.as_ref()
    }

    /// Get the current health status.
    pub fn health(&self) -> &RuntimeHealth {
        &self.health
    }

    /// Check if the runtime is ready to serve requests.
    pub fn is_ready(&self) -> bool {
        self.health.is_ready()
    }

    /// Check if the runtime is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Get a shutdown receiver for graceful shutdown coordination.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Initialize and start all runtime components.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!(bind = %self.bind, "starting gateway runtime");

        self.init_storage()?;
        self.init_workers();
        self.start_listener()?;

        self.running.store(true, Ordering::Release);
        tracing::info!("gateway runtime started");
        Ok(())
    }

    /// Initialize the storage layer: data directory plus schema.
    fn init_storage(&mut self) -> Result<()> {
        tracing::debug!("initializing storage layer");

        std::fs::create_dir_all(self.config.paths.data_dir())
            .context("failed to create data directory")?;
        let store = crate::storage::Store::new(self.config.paths.db_path());
        store.ensure().context("failed to initialize database")?;

        self.health.storage = ComponentHealth::Healthy;
        tracing::info!(
            db_path = %self.config.paths.db_path().display(),
            "storage layer initialized"
        );
        Ok(())
    }

    /// Build the shared application state and worker controllers.
    fn init_workers(&mut self) {
        tracing::debug!("initializing worker controllers");
        self.state = Some(AppState::new(self.config.clone()));
        self.health.workers = ComponentHealth::Healthy;
        tracing::info!("worker controllers initialized");
    }

    /// Start the web listener.
    fn start_listener(&mut self) -> Result<()> {
        tracing::debug!("starting web listener");

        let state = self
            .state
            .clone()
            .context("workers must be initialized before the listener")?;
        let bind = self.bind;
        let shutdown_rx = self.shutdown_rx.clone();
        let handle = tokio::spawn(async move { server::serve(bind, state, shutdown_rx).await });

        self.server_handle = Some(handle);
        self.health.listener = ComponentHealth::Healthy;
        Ok(())
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for ctrl-c, a shutdown request, or server exit.
    pub async fn wait(&mut self) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        if let Some(handle) = self.server_handle.take() {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::warn!("shutdown signal received (SIGINT)");
                }
                _ = async {
                    while !*shutdown_rx.borrow() {
                        if shutdown_rx.changed().await.is_err() {
                            break;
                        }
                    }
                } => {
                    tracing::info!("shutdown requested by component");
                }
                result = handle => {
                    match result {
                        Ok(Ok(())) => tracing::info!("web server stopped normally"),
                        Ok(Err(e)) => tracing::error!(error = %e, "web server failed"),
                        Err(e) => tracing::error!(error = %e, "web server task panicked"),
                    }
                }
            }
        } else {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::warn!("shutdown signal received (SIGINT)");
                }
                _ = async {
                    while !*shutdown_rx.borrow() {
                        if shutdown_rx.changed().await.is_err() {
                            break;
                        }
                    }
                } => {
                    tracing::info!("shutdown requested by component");
                }
            }
        }
    }

    /// Run the runtime until shutdown.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;
        self.wait().await;
        self.stop().await
    }

    /// Stop all runtime components in reverse start order.
    pub async fn stop(&mut self) -> Result<()> {
        tracing::info!("stopping gateway runtime");
        self.running.store(false, Ordering::Release);
        let _ = self.shutdown_tx.send(true);

        self.stop_listener().await;
        self.stop_workers().await;
        self.health.storage = ComponentHealth::Stopped;

        tracing::info!("gateway runtime stopped");
        Ok(())
    }

    async fn stop_listener(&mut self) {
        tracing::debug!("stopping web listener");
        self.health.listener = ComponentHealth::Stopping;

        if let Some(handle) = self.server_handle.take() {
            match tokio::time::timeout(std::time::Duration::from_secs(5), handle).await {
                Ok(Ok(Ok(()))) => tracing::info!("web server stopped"),
                Ok(Ok(Err(e))) => tracing::warn!(error = %e, "web server stopped with error"),
                Ok(Err(e)) => tracing::warn!(error = %e, "web server task panicked"),
                Err(_) => tracing::warn!("web server stop timed out"),
            }
        }

        self.health.listener = ComponentHealth::Stopped;
    }

    async fn stop_workers(&mut self) {
        tracing::debug!("stopping worker controllers");
        self.health.workers = ComponentHealth::Stopping;

        if let Some(state) = &self.state {
            state.discovery.stop(STOP_WAIT).await;
            state.poll.stop(STOP_WAIT).await;
        }

        self.health.workers = ComponentHealth::Stopped;
    }

    /// Start the runtime for tests (without the listener or signal
    /// handling).
    pub async fn start_for_tests(&mut self) -> Result<()> {
        self.init_storage()?;
        self.init_workers();
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    /// Stop the runtime for tests.
    pub async fn shutdown_for_tests(&mut self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.running.store(false, Ordering::Release);
        Ok(())
    }
}
