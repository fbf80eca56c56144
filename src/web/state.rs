//! Run and poll state visible through the web API.
//!
//! Progress events from the discovery and poll workers are folded into
//! these snapshots; every route that reports status serializes a clone, so
//! readers never observe a half-applied event. Event logs are bounded to
//! the most recent entries.

use crate::bacnet::discovery::{DiscoveryOptions, ProgressEvent};
use crate::bacnet::poller::PollEvent;
use crate::storage::db::utc_now_iso;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bound on retained progress events.
pub const EVENT_LOG_LIMIT: usize = 500;

/// Lifecycle of the discovery worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Running,
    Stopping,
    Stopped,
    Done,
    Error,
}

/// Lifecycle of the poll worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    Idle,
    Running,
    Stopping,
    Stopped,
    Error,
}

/// Per-device progress counters for the current discovery run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceStats {
    pub address: Option<String>,
    pub objects: usize,
    pub snapshot: usize,
}

/// Discovery run state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub status: RunStatus,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub total_devices: usize,
    pub completed: usize,
    pub last_event: Option<serde_json::Value>,
    pub device_stats: BTreeMap<u32, DeviceStats>,
    pub error: Option<String>,
    pub events: Vec<serde_json::Value>,
    pub last_options: DiscoveryOptions,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            status: RunStatus::Idle,
            started_at: None,
            finished_at: None,
            total_devices: 0,
            completed: 0,
            last_event: None,
            device_stats: BTreeMap::new(),
            error: None,
            events: Vec::new(),
            last_options: DiscoveryOptions::default(),
        }
    }
}

impl RunState {
    /// Reset for a new run started with `options`.
    pub fn begin(&mut self, options: DiscoveryOptions) {
        *self = Self {
            status: RunStatus::Running,
            started_at: Some(utc_now_iso()),
            last_options: options,
            ..Self::default()
        };
    }

    /// Return to idle, keeping the remembered options.
    pub fn reset(&mut self) {
        let last_options = self.last_options.clone();
        *self = Self {
            last_options,
            ..Self::default()
        };
    }

    /// Fold one worker event into the snapshot.
    pub fn apply(&mut self, event: &ProgressEvent) {
        let entry = event_json(event);
        self.last_event = Some(entry.clone());
        push_event(&mut self.events, entry);

        match event {
            ProgressEvent::Start { ts } => {
                self.status = RunStatus::Running;
                self.started_at = Some(ts.clone());
                self.finished_at = None;
                self.total_devices = 0;
                self.completed = 0;
                self.device_stats.clear();
                self.error = None;
            }
            ProgressEvent::WhoisComplete { total_devices, .. } => {
                self.total_devices = *total_devices;
            }
            ProgressEvent::DeviceStart { device_id, address } => {
                let stats = self.device_stats.entry(*device_id).or_default();
                stats.address = Some(address.clone());
            }
            ProgressEvent::DeviceObjects { device_id, count } => {
                self.device_stats.entry(*device_id).or_default().objects = *count;
            }
            ProgressEvent::DeviceSnapshot { device_id, count } => {
                self.device_stats.entry(*device_id).or_default().snapshot = *count;
            }
            ProgressEvent::DeviceDone { .. } | ProgressEvent::DeviceError { .. } => {
                self.completed = (self.completed + 1).min(self.total_devices);
            }
            ProgressEvent::Cancelled => {
                self.status = RunStatus::Stopping;
            }
            ProgressEvent::Complete { .. } => {
                self.status = RunStatus::Done;
                self.finished_at = Some(utc_now_iso());
            }
            ProgressEvent::PortSelected { .. } => {}
        }
    }

    /// Record the worker's exit.
    pub fn finish(&mut self, result: Result<(), String>, was_cancelled: bool) {
        match result {
            Ok(()) => {
                if was_cancelled && !matches!(self.status, RunStatus::Error | RunStatus::Done) {
                    self.status = RunStatus::Stopped;
                    self.finished_at = Some(utc_now_iso());
                }
            }
            Err(message) => {
                self.status = RunStatus::Error;
                self.error = Some(message);
                self.finished_at = Some(utc_now_iso());
            }
        }
    }
}

/// Counters from the most recent poll cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LastCycle {
    pub points: usize,
    pub read: usize,
    pub errors: usize,
    pub ts: Option<String>,
}

/// Poll loop state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollState {
    pub status: PollStatus,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub last_error: Option<String>,
    pub last_event: Option<serde_json::Value>,
    pub events: Vec<serde_json::Value>,
    pub interval_sec: Option<u64>,
    pub project: Option<String>,
    pub map_path: Option<String>,
    pub last_cycle: LastCycle,
}

impl Default for PollState {
    fn default() -> Self {
        Self {
            status: PollStatus::Idle,
            started_at: None,
            finished_at: None,
            last_error: None,
            last_event: None,
            events: Vec::new(),
            interval_sec: None,
            project: None,
            map_path: None,
            last_cycle: LastCycle::default(),
        }
    }
}

impl PollState {
    /// Reset for a freshly started loop.
    pub fn begin(&mut self, project: Option<String>, map_path: String, interval_sec: u64) {
        self.status = PollStatus::Running;
        self.started_at = Some(utc_now_iso());
        self.finished_at = None;
        self.last_error = None;
        self.events.clear();
        self.interval_sec = Some(interval_sec);
        self.project = project;
        self.map_path = Some(map_path);
    }

    /// Fold one poller event into the snapshot.
    pub fn apply(&mut self, event: &PollEvent) {
        let entry = event_json(event);
        self.last_event = Some(entry.clone());
        push_event(&mut self.events, entry);

        match event {
            PollEvent::PollCycleStart { points } => {
                self.last_cycle = LastCycle {
                    points: *points,
                    read: 0,
                    errors: 0,
                    ts: Some(utc_now_iso()),
                };
            }
            PollEvent::PollCycleDone {
                points,
                read,
                errors,
            } => {
                self.last_cycle = LastCycle {
                    points: *points,
                    read: *read,
                    errors: *errors,
                    ts: Some(utc_now_iso()),
                };
            }
            PollEvent::PollCycleError { error } => {
                self.last_error = Some(error.clone());
            }
            PollEvent::PollPortSelected { .. } => {}
        }
    }

    /// Record the loop's exit.
    pub fn finish(&mut self, was_cancelled: bool) {
        if was_cancelled && self.status != PollStatus::Error {
            self.status = PollStatus::Stopped;
        }
        self.finished_at = Some(utc_now_iso());
    }
}

/// Serialize an event, stamping a `ts` field when the event has none.
fn event_json<E: Serialize>(event: &E) -> serde_json::Value {
    let mut value = serde_json::to_value(event).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(map) = value.as_object_mut() {
        map.entry("ts".to_string())
            .or_insert_with(|| serde_json::Value::String(utc_now_iso()));
    }
    value
}

fn push_event(events: &mut Vec<serde_json::Value>, entry: serde_json::Value) {
    events.push(entry);
    if events.len() > EVENT_LOG_LIMIT {
        let excess = events.len() - EVENT_LOG_LIMIT;
        events.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_state_follows_a_full_run() {
        let mut state = RunState::default();
        state.begin(DiscoveryOptions::default());
        assert_eq!(state.status, RunStatus::Running);

        state.apply(&ProgressEvent::Start {
            ts: "2026-01-01T00:00:00Z".into(),
        });
        state.apply(&ProgressEvent::WhoisComplete {
            total_devices: 2,
            method: "who-is".into(),
        });
        state.apply(&ProgressEvent::DeviceStart {
            device_id: 10,
            address: "192.168.1.40:47808".into(),
        });
        state.apply(&ProgressEvent::DeviceObjects {
            device_id: 10,
            count: 14,
        });
        state.apply(&ProgressEvent::DeviceDone { device_id: 10 });
        state.apply(&ProgressEvent::DeviceError {
            device_id: 11,
            address: "192.168.1.41:47808".into(),
            error: "unreachable".into(),
        });
        state.apply(&ProgressEvent::Complete {
            db_path: "data/bacnet_topology.db".into(),
        });

        assert_eq!(state.status, RunStatus::Done);
        assert_eq!(state.completed, 2);
        assert_eq!(state.device_stats[&10].objects, 14);
        assert!(state.finished_at.is_some());
    }

    #[test]
    fn completed_never_exceeds_total() {
        let mut state = RunState::default();
        state.apply(&ProgressEvent::WhoisComplete {
            total_devices: 1,
            method: "who-is".into(),
        });
        state.apply(&ProgressEvent::DeviceDone { device_id: 1 });
        state.apply(&ProgressEvent::DeviceDone { device_id: 2 });
        assert_eq!(state.completed, 1);
    }

    #[test]
    fn cancelled_run_ends_stopped() {
        let mut state = RunState::default();
        state.begin(DiscoveryOptions::default());
        state.apply(&ProgressEvent::Cancelled);
        assert_eq!(state.status, RunStatus::Stopping);
        state.finish(Ok(()), true);
        assert_eq!(state.status, RunStatus::Stopped);
    }

    #[test]
    fn failed_run_records_the_error() {
        let mut state = RunState::default();
        state.begin(DiscoveryOptions::default());
        state.finish(Err("no usable BACnet port".into()), false);
        assert_eq!(state.status, RunStatus::Error);
        assert_eq!(state.error.as_deref(), Some("no usable BACnet port"));
    }

    #[test]
    fn event_log_is_bounded() {
        let mut state = RunState::default();
        for i in 0..(EVENT_LOG_LIMIT + 50) {
            state.apply(&ProgressEvent::DeviceDone {
                device_id: i as u32,
            });
        }
        assert_eq!(state.events.len(), EVENT_LOG_LIMIT);
    }

    #[test]
    fn events_are_stamped() {
        let mut state = PollState::default();
        state.apply(&PollEvent::PollCycleStart { points: 4 });
        let entry = state.events.last().expect("entry");
        assert_eq!(entry["event"], "poll_cycle_start");
        assert!(entry["ts"].is_string());
    }

    #[test]
    fn poll_cycle_counters_update() {
        let mut state = PollState::default();
        state.begin(Some("plant".into()), "data/extraction_map_plant.csv".into(), 900);
        state.apply(&PollEvent::PollCycleDone {
            points: 12,
            read: 11,
            errors: 1,
        });
        assert_eq!(state.last_cycle.read, 11);
        assert_eq!(state.last_cycle.errors, 1);
        state.finish(true);
        assert_eq!(state.status, PollStatus::Stopped);
    }

    #[test]
    fn reset_keeps_last_options() {
        let mut state = RunState::default();
        state.begin(DiscoveryOptions {
            local: Some("10.0.0.2/24".into()),
            ..DiscoveryOptions::default()
        });
        state.finish(Err("boom".into()), false);
        state.reset();
        assert_eq!(state.status, RunStatus::Idle);
        assert!(state.error.is_none());
        assert_eq!(state.last_options.local.as_deref(), Some("10.0.0.2/24"));
    }
}
