//! Discovery and poll worker controllers.
//!
//! Each controller owns one background task at a time, the shared state
//! snapshot the web layer reports, and the cancellation flag the worker
//! observes. Stop paths wait a bounded time for the worker to wind down
//! and then leave it to finish detached, so no route ever blocks on a
//! stuck socket.

use crate::bacnet::discovery::{self, CancelFlag, DiscoveryOptions};
use crate::bacnet::poller;
use crate::core::config::NetworkConfig;
use crate::core::error::{BacexError, BacexResult};
use crate::storage::Store;
use crate::web::state::{PollState, PollStatus, RunState, RunStatus};
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Bounded wait applied by stop routes.
pub const STOP_WAIT: Duration = Duration::from_secs(3);
/// Bounded wait applied by restart and hard-refresh routes.
pub const RESTART_WAIT: Duration = Duration::from_secs(5);

/// Controller for the discovery worker.
pub struct DiscoveryController {
    net: NetworkConfig,
    store: Store,
    state: Arc<RwLock<RunState>>,
    cancel: CancelFlag,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DiscoveryController {
    /// Create an idle controller.
    pub fn new(net: NetworkConfig, store: Store) -> Self {
        Self {
            net,
            store,
            state: Arc::new(RwLock::new(RunState::default())),
            cancel: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Snapshot the run state.
    pub fn snapshot(&self) -> RunState {
        self.state.read().clone()
    }

    /// Whether a run is currently active.
    pub fn is_running(&self) -> bool {
        self.state.read().status == RunStatus::Running
    }

    /// Start a discovery run. A run already in flight is an error.
    pub fn start(&self, options: DiscoveryOptions) -> BacexResult<()> {
        {
            let mut state = self.state.write();
            if state.status == RunStatus::Running {
                return Err(BacexError::AlreadyRunning {
                    worker: "discovery",
                });
            }
            state.begin(options.clone());
        }
        self.cancel.store(false, Ordering::Relaxed);

        let net = self.net.clone();
        let store = self.store.clone();
        let state = self.state.clone();
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let progress = {
                let state = state.clone();
                move |ev| state.write().apply(&ev)
            };
            let result = discovery::run(&net, &options, &store, progress, &cancel).await;
            let was_cancelled = cancel.load(Ordering::Relaxed);
            state
                .write()
                .finish(result.map_err(|e| e.to_string()), was_cancelled);
        });
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    /// Request cancellation and wait up to `wait` for the worker to exit.
    pub async fn stop(&self, wait: Duration) {
        {
            let state = self.state.read();
            if !matches!(state.status, RunStatus::Running | RunStatus::Stopping) {
                return;
            }
        }
        self.cancel.store(true, Ordering::Relaxed);
        self.join_with_timeout(wait).await;
    }

    /// Cancel any active run and start again with the remembered options.
    pub async fn restart(&self) -> BacexResult<()> {
        self.stop(RESTART_WAIT).await;
        let options = self.state.read().last_options.clone();
        self.start(options)
    }

    /// Return to idle. Only valid when no run is active.
    pub fn reset(&self) -> BacexResult<()> {
        let mut state = self.state.write();
        if state.status == RunStatus::Running {
            return Err(BacexError::AlreadyRunning {
                worker: "discovery",
            });
        }
        state.reset();
        Ok(())
    }

    /// Cancel any active run, wait briefly, and reset to a blank idle
    /// state, remembered options included.
    pub async fn hard_refresh(&self) {
        self.stop(RESTART_WAIT).await;
        *self.state.write() = RunState::default();
        self.cancel.store(false, Ordering::Relaxed);
    }

    async fn join_with_timeout(&self, wait: Duration) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(wait, handle).await.is_err() {
                tracing::warn!("discovery worker did not stop in time; detaching");
            }
        }
    }
}

/// Controller for the poll loop.
pub struct PollController {
    net: NetworkConfig,
    store: Store,
    state: Arc<RwLock<PollState>>,
    cancel: CancelFlag,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PollController {
    /// Create an idle controller.
    pub fn new(net: NetworkConfig, store: Store) -> Self {
        Self {
            net,
            store,
            state: Arc::new(RwLock::new(PollState::default())),
            cancel: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Snapshot the poll state.
    pub fn snapshot(&self) -> PollState {
        self.state.read().clone()
    }

    /// Whether the loop is currently active.
    pub fn is_running(&self) -> bool {
        self.state.read().status == PollStatus::Running
    }

    /// Record an operator-visible error outside a running loop (e.g. a bad
    /// upload).
    pub fn set_last_error(&self, message: impl Into<String>) {
        self.state.write().last_error = Some(message.into());
    }

    /// Remember the active project and map after an upload.
    pub fn set_project(&self, project: String, map_path: PathBuf) {
        let mut state = self.state.write();
        state.project = Some(project);
        state.map_path = Some(map_path.display().to_string());
        state.last_error = None;
    }

    /// Start the poll loop. A loop already in flight is an error.
    pub fn start(
        &self,
        map_path: PathBuf,
        project: Option<String>,
        interval: Duration,
        options: &DiscoveryOptions,
    ) -> BacexResult<()> {
        {
            let mut state = self.state.write();
            if state.status == PollStatus::Running {
                return Err(BacexError::AlreadyRunning { worker: "poller" });
            }
            state.begin(
                project,
                map_path.display().to_string(),
                interval.as_secs(),
            );
        }
        self.cancel.store(false, Ordering::Relaxed);

        let net = options.effective(&self.net);
        let store = self.store.clone();
        let state = self.state.clone();
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let progress = {
                let state = state.clone();
                move |ev| state.write().apply(&ev)
            };
            poller::run_loop(&net, &map_path, interval, &store, progress, &cancel).await;
            let was_cancelled = cancel.load(Ordering::Relaxed);
            state.write().finish(was_cancelled);
            cancel.store(false, Ordering::Relaxed);
        });
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    /// Request cancellation and wait up to `wait` for the loop to exit.
    pub async fn stop(&self, wait: Duration) {
        {
            let mut state = self.state.write();
            if !matches!(state.status, PollStatus::Running | PollStatus::Stopping) {
                return;
            }
            state.status = PollStatus::Stopping;
        }
        self.cancel.store(true, Ordering::Relaxed);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(wait, handle).await.is_err() {
                tracing::warn!("poll worker did not stop in time; detaching");
            }
        }
    }
}
