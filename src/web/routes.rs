//! HTTP routes.
//!
//! Control posts redirect back to the overview, status endpoints return
//! deep-copied snapshots, and every data table is downloadable as CSV or
//! JSON.

use crate::bacnet::discovery::DiscoveryOptions;
use crate::bacnet::map;
use crate::core::error::{BacexError, HttpErrorMapping};
use crate::ops::telemetry::{process_memory, ProcessMemory};
use crate::ops::version::VersionInfo;
use crate::storage::export;
use crate::web::state::{PollState, RunState};
use crate::web::workers::STOP_WAIT;
use crate::web::AppState;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/restart", post(restart))
        .route("/reset", post(reset))
        .route("/hard-refresh", post(hard_refresh))
        .route("/status.json", get(status_json))
        .route("/logs", get(logs))
        .route("/poll/upload", post(poll_upload))
        .route("/poll/start", post(poll_start))
        .route("/poll/stop", post(poll_stop))
        .route("/poll/status.json", get(poll_status_json))
        .route("/devices", get(devices))
        .route("/devices/{device_id}", get(device_detail))
        .route("/data/object-counts.json", get(object_counts))
        .route("/data/points.json", get(points_json))
        .route("/data/points.csv", get(points_csv))
        .route("/data/devices.json", get(devices_json))
        .route("/data/devices.csv", get(devices_csv))
        .route("/data/devices/{device_id}/objects.json", get(device_objects_json))
        .route("/data/devices/{device_id}/objects.csv", get(device_objects_csv))
        .route("/data/devices/{device_id}/samples.json", get(device_samples_json))
        .route("/data/devices/{device_id}/samples.csv", get(device_samples_csv))
        .route(
            "/data/devices/{device_id}/samples-all.json",
            get(device_samples_all_json),
        )
        .route(
            "/data/devices/{device_id}/samples-all.csv",
            get(device_samples_all_csv),
        )
        .route("/data/samples-all.json", get(samples_all_json))
        .route("/data/samples-all.csv", get(samples_all_csv))
        .with_state(state)
}

/// JSON error envelope for API failures.
pub struct ApiError(BacexError);

impl From<BacexError> for ApiError {
    fn from(err: BacexError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = HttpErrorMapping::to_status(&self.0);
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

fn csv_response(filename: &str, body: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={filename}"),
            ),
        ],
        body,
    )
        .into_response()
}

// ============================================================================
// Overview and discovery control
// ============================================================================

#[derive(Serialize)]
struct Overview {
    state: RunState,
    poll: PollState,
    maps: Vec<String>,
    proc_mem: ProcessMemory,
    version: VersionInfo,
}

async fn index(State(app): State<AppState>) -> Json<Overview> {
    let maps = map::list_map_files(&app.config.paths.data_dir())
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
        .collect();
    Json(Overview {
        state: app.discovery.snapshot(),
        poll: app.poll.snapshot(),
        maps,
        proc_mem: process_memory(),
        version: VersionInfo::current(),
    })
}

#[derive(Debug, Deserialize)]
struct StartForm {
    #[serde(default)]
    local: Option<String>,
    #[serde(default)]
    port: Option<String>,
    #[serde(default)]
    sleep: Option<String>,
    #[serde(default)]
    snapshot: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let v = v.trim().to_string();
        if v.is_empty() {
            None
        } else {
            Some(v)
        }
    })
}

async fn start(State(app): State<AppState>, Form(form): Form<StartForm>) -> Redirect {
    let options = DiscoveryOptions {
        local: non_empty(form.local),
        port: non_empty(form.port).and_then(|p| p.parse().ok()),
        sleep_ms: non_empty(form.sleep)
            .and_then(|s| s.parse::<f64>().ok())
            .map(|secs| (secs * 1000.0) as u64),
        snapshot: form.snapshot.as_deref() == Some("on"),
    };
    // A run already in flight makes the post a no-op.
    if let Err(e) = app.discovery.start(options) {
        tracing::debug!(error = %e, "discovery start ignored");
    }
    Redirect::to("/")
}

async fn stop(State(app): State<AppState>) -> Redirect {
    app.discovery.stop(STOP_WAIT).await;
    Redirect::to("/")
}

async fn restart(State(app): State<AppState>) -> Redirect {
    if let Err(e) = app.discovery.restart().await {
        tracing::debug!(error = %e, "discovery restart ignored");
    }
    Redirect::to("/")
}

async fn reset(State(app): State<AppState>) -> Redirect {
    if let Err(e) = app.discovery.reset() {
        tracing::debug!(error = %e, "reset ignored while running");
    }
    Redirect::to("/")
}

async fn hard_refresh(State(app): State<AppState>) -> Redirect {
    app.discovery.hard_refresh().await;
    Redirect::to("/")
}

#[derive(Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    state: RunState,
    process_memory: ProcessMemory,
}

async fn status_json(State(app): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        state: app.discovery.snapshot(),
        process_memory: process_memory(),
    })
}

async fn logs(State(app): State<AppState>) -> Json<Vec<serde_json::Value>> {
    let mut events = app.discovery.snapshot().events;
    events.reverse();
    Json(events)
}

// ============================================================================
// Poller control
// ============================================================================

async fn poll_upload(State(app): State<AppState>, mut multipart: Multipart) -> Redirect {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut project: Option<String> = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                if let Ok(bytes) = field.bytes().await {
                    file = Some((filename, bytes.to_vec()));
                }
            }
            Some("project") => {
                if let Ok(text) = field.text().await {
                    project = non_empty(Some(text));
                }
            }
            _ => {}
        }
    }

    let Some((filename, bytes)) = file.filter(|(name, _)| !name.is_empty()) else {
        app.poll.set_last_error("No file uploaded");
        return Redirect::to("/");
    };

    let project = project.unwrap_or_else(|| {
        std::path::Path::new(&filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("default")
            .to_string()
    });
    let project = map::sanitize_project(&project);

    let data_dir = app.config.paths.data_dir();
    let out_path = map::map_path(&data_dir, &project);
    let write = std::fs::create_dir_all(&data_dir)
        .and_then(|()| std::fs::write(&out_path, &bytes));
    match write {
        Ok(()) => app.poll.set_project(project, out_path),
        Err(e) => app.poll.set_last_error(format!("upload failed: {e}")),
    }
    Redirect::to("/")
}

#[derive(Debug, Deserialize)]
struct PollStartForm {
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    interval: Option<String>,
    #[serde(default)]
    local: Option<String>,
    #[serde(default)]
    port: Option<String>,
}

async fn poll_start(State(app): State<AppState>, Form(form): Form<PollStartForm>) -> Redirect {
    if app.poll.is_running() {
        return Redirect::to("/");
    }

    let snapshot = app.poll.snapshot();
    let mut project = non_empty(form.project).or_else(|| snapshot.project.clone());
    let interval = non_empty(form.interval)
        .and_then(|v| v.parse().ok())
        .unwrap_or(app.config.poller.default_interval_secs);

    let data_dir = app.config.paths.data_dir();
    let remembered = if project.is_some() && project == snapshot.project {
        snapshot.map_path.clone().map(std::path::PathBuf::from)
    } else {
        None
    };
    let map_path = match remembered {
        Some(path) => Some(path),
        None => {
            let by_name = project
                .as_deref()
                .map(|p| map::map_path(&data_dir, p))
                .filter(|p| p.exists());
            match by_name {
                Some(path) => Some(path),
                None => {
                    let first = map::list_map_files(&data_dir).into_iter().next();
                    if let Some(ref path) = first {
                        project = map::project_from_path(path);
                    }
                    first
                }
            }
        }
    };

    let Some(map_path) = map_path.filter(|p| p.exists()) else {
        app.poll
            .set_last_error("No extraction map found. Upload one first.");
        return Redirect::to("/");
    };

    let options = DiscoveryOptions {
        local: non_empty(form.local),
        port: non_empty(form.port).and_then(|p| p.parse().ok()),
        ..DiscoveryOptions::default()
    };
    if let Err(e) = app.poll.start(
        map_path,
        project,
        Duration::from_secs(interval),
        &options,
    ) {
        tracing::debug!(error = %e, "poll start ignored");
    }
    Redirect::to("/")
}

async fn poll_stop(State(app): State<AppState>) -> Redirect {
    app.poll.stop(STOP_WAIT).await;
    Redirect::to("/")
}

async fn poll_status_json(State(app): State<AppState>) -> Json<PollState> {
    Json(app.poll.snapshot())
}

// ============================================================================
// Inventory and data exports
// ============================================================================

async fn devices(State(app): State<AppState>) -> Result<Response, ApiError> {
    Ok(Json(app.store.devices()?).into_response())
}

#[derive(Serialize)]
struct DeviceDetail {
    device: crate::storage::db::DeviceRow,
    objects: Vec<crate::storage::db::ObjectRow>,
    samples: Vec<crate::storage::db::SampleRow>,
}

async fn device_detail(
    State(app): State<AppState>,
    Path(device_id): Path<u32>,
) -> Result<Response, ApiError> {
    let Some(device) = app.store.device(device_id)? else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("device {device_id} not found") })),
        )
            .into_response());
    };
    Ok(Json(DeviceDetail {
        device,
        objects: app.store.objects_for_device(device_id)?,
        samples: app.store.samples(Some(device_id), Some(100))?,
    })
    .into_response())
}

async fn object_counts(State(app): State<AppState>) -> Result<Response, ApiError> {
    Ok(Json(app.store.object_counts()?).into_response())
}

async fn points_json(State(app): State<AppState>) -> Result<Response, ApiError> {
    Ok(Json(app.store.points(None)?).into_response())
}

async fn points_csv(State(app): State<AppState>) -> Result<Response, ApiError> {
    let rows = app.store.points(None)?;
    Ok(csv_response("points.csv", export::points_csv(&rows)))
}

async fn devices_json(State(app): State<AppState>) -> Result<Response, ApiError> {
    Ok(Json(app.store.devices()?).into_response())
}

async fn devices_csv(State(app): State<AppState>) -> Result<Response, ApiError> {
    let rows = app.store.devices()?;
    Ok(csv_response("devices.csv", export::devices_csv(&rows)))
}

async fn device_objects_json(
    State(app): State<AppState>,
    Path(device_id): Path<u32>,
) -> Result<Response, ApiError> {
    Ok(Json(app.store.points(Some(device_id))?).into_response())
}

async fn device_objects_csv(
    State(app): State<AppState>,
    Path(device_id): Path<u32>,
) -> Result<Response, ApiError> {
    let rows = app.store.points(Some(device_id))?;
    Ok(csv_response(
        &format!("device_{device_id}_objects.csv"),
        export::points_csv(&rows),
    ))
}

async fn device_samples_json(
    State(app): State<AppState>,
    Path(device_id): Path<u32>,
) -> Result<Response, ApiError> {
    Ok(Json(app.store.samples(Some(device_id), Some(100))?).into_response())
}

async fn device_samples_csv(
    State(app): State<AppState>,
    Path(device_id): Path<u32>,
) -> Result<Response, ApiError> {
    let rows = app.store.samples(Some(device_id), Some(100))?;
    Ok(csv_response(
        &format!("device_{device_id}_samples.csv"),
        export::samples_csv(&rows),
    ))
}

async fn device_samples_all_json(
    State(app): State<AppState>,
    Path(device_id): Path<u32>,
) -> Result<Response, ApiError> {
    Ok(Json(app.store.samples(Some(device_id), None)?).into_response())
}

async fn device_samples_all_csv(
    State(app): State<AppState>,
    Path(device_id): Path<u32>,
) -> Result<Response, ApiError> {
    let rows = app.store.samples(Some(device_id), None)?;
    Ok(csv_response(
        &format!("device_{device_id}_samples_all.csv"),
        export::samples_csv(&rows),
    ))
}

async fn samples_all_json(State(app): State<AppState>) -> Result<Response, ApiError> {
    Ok(Json(app.store.samples(None, None)?).into_response())
}

async fn samples_all_csv(State(app): State<AppState>) -> Result<Response, ApiError> {
    let rows = app.store.samples(None, None)?;
    Ok(csv_response("samples_all.csv", export::samples_csv(&rows)))
}
