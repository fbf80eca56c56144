//! Device and object inventory.
//!
//! One discovery run broadcasts Who-Is, then walks the responding devices:
//! device-object properties into `devices`, the object list into `objects`,
//! and optionally a one-shot presentValue snapshot into `samples`. Progress
//! is reported through a callback so the web layer and the CLI can observe
//! the same run; cancellation is checked between devices and inside delays.

use crate::bacnet::client::BacnetClient;
use crate::bacnet::{DeviceInfo, ObjectId, PropertyId, PropertyValue};
use crate::core::config::NetworkConfig;
use crate::core::error::{BacexError, BacexResult};
use crate::storage::db::utc_now_iso;
use crate::storage::{SampleInsert, Store};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared cancellation flag, observed at device boundaries and in delays.
pub type CancelFlag = Arc<AtomicBool>;

/// Progress events emitted during a discovery run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    PortSelected {
        port: u16,
        tried: Vec<u16>,
    },
    Start {
        ts: String,
    },
    WhoisComplete {
        total_devices: usize,
        method: String,
    },
    DeviceStart {
        device_id: u32,
        address: String,
    },
    DeviceError {
        device_id: u32,
        address: String,
        error: String,
    },
    DeviceObjects {
        device_id: u32,
        count: usize,
    },
    DeviceSnapshot {
        device_id: u32,
        count: usize,
    },
    DeviceDone {
        device_id: u32,
    },
    Cancelled,
    Complete {
        db_path: String,
    },
}

/// Per-run options layered over the configured network settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryOptions {
    /// Interface selector override.
    pub local: Option<String>,
    /// Preferred port override.
    pub port: Option<u16>,
    /// Inter-device delay override, in milliseconds.
    pub sleep_ms: Option<u64>,
    /// Whether to snapshot presentValue for value-carrying objects.
    #[serde(default)]
    pub snapshot: bool,
}

impl DiscoveryOptions {
    /// Produce the effective network configuration for this run.
    pub fn effective(&self, base: &NetworkConfig) -> NetworkConfig {
        let mut net = base.clone();
        if let Some(ref local) = self.local {
            if !local.trim().is_empty() {
                net.local_interface = Some(local.clone());
            }
        }
        if let Some(port) = self.port {
            net.port = port;
        }
        if let Some(sleep_ms) = self.sleep_ms {
            net.sleep_between_ms = sleep_ms;
        }
        net
    }
}

/// Run one discovery sweep.
pub async fn run(
    base: &NetworkConfig,
    options: &DiscoveryOptions,
    store: &Store,
    progress: impl Fn(ProgressEvent),
    cancel: &CancelFlag,
) -> BacexResult<()> {
    let net = options.effective(base);

    let mut client = BacnetClient::bind(&net).await?;
    let selection = client.port_selection().clone();
    progress(ProgressEvent::PortSelected {
        port: selection.port,
        tried: selection.tried,
    });
    progress(ProgressEvent::Start { ts: utc_now_iso() });

    tracing::info!("broadcasting Who-Is");
    let announcements = client
        .who_is(Duration::from_millis(net.whois_window_ms))
        .await?;
    tracing::info!(count = announcements.len(), "discovery found devices");
    progress(ProgressEvent::WhoisComplete {
        total_devices: announcements.len(),
        method: "who-is".to_string(),
    });

    store.ensure()?;

    for announcement in &announcements {
        if cancel.load(Ordering::Relaxed) {
            progress(ProgressEvent::Cancelled);
            break;
        }

        let device_id = announcement.iam.device.instance;
        let peer = announcement.source;
        let address = peer.to_string();
        tracing::debug!(device_id, %address, "inventorying device");
        progress(ProgressEvent::DeviceStart {
            device_id,
            address: address.clone(),
        });

        let mut info = DeviceInfo::from_iam(device_id, address.clone());
        info.max_apdu = Some(announcement.iam.max_apdu);
        info.segmentation = Some(announcement.iam.segmentation);
        info.vendor_id = Some(announcement.iam.vendor_id);

        let device_object = ObjectId::device(device_id);
        match read_identity(&mut client, peer, device_object, &mut info).await {
            Ok(()) => {}
            Err(e) => {
                tracing::warn!(device_id, %address, error = %e, "device unreachable");
                progress(ProgressEvent::DeviceError {
                    device_id,
                    address: address.clone(),
                    error: e.to_string(),
                });
                continue;
            }
        }

        store.upsert_device(&info, &utc_now_iso())?;

        let object_ids = match read_object_list(&mut client, peer, device_object).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(device_id, error = %e, "objectList read failed");
                Vec::new()
            }
        };

        let mut objects = Vec::with_capacity(object_ids.len());
        for id in &object_ids {
            let name = read_string_property(&mut client, peer, *id, PropertyId::ObjectName).await;
            objects.push((id.object_type.name(), id.instance, name));
        }
        let obj_count = store.insert_objects(device_id, &objects)?;
        progress(ProgressEvent::DeviceObjects {
            device_id,
            count: obj_count,
        });

        if options.snapshot && obj_count > 0 {
            let count =
                snapshot_present_values(&mut client, peer, device_id, &object_ids, store).await?;
            progress(ProgressEvent::DeviceSnapshot { device_id, count });
        }

        sleep_cancellable(Duration::from_millis(net.sleep_between_ms), cancel).await;
        progress(ProgressEvent::DeviceDone { device_id });
    }

    tracing::info!(db_path = %store.path().display(), "discovery complete");
    progress(ProgressEvent::Complete {
        db_path: store.path().display().to_string(),
    });
    Ok(())
}

/// Read the device-object identity properties, best-effort per property.
///
/// A timeout on the first read means the device never answered unicast
/// traffic at all and is reported as unreachable; later failures only leave
/// the corresponding column empty.
async fn read_identity(
    client: &mut BacnetClient,
    peer: SocketAddr,
    device_object: ObjectId,
    info: &mut DeviceInfo,
) -> BacexResult<()> {
    match read_string_property_checked(client, peer, device_object, PropertyId::VendorName).await {
        Ok(value) => info.vendor_name = value,
        Err(e @ BacexError::ReadTimeout { .. }) => return Err(e),
        Err(_) => {}
    }
    info.model_name = read_string_property(client, peer, device_object, PropertyId::ModelName).await;
    info.firmware_rev =
        read_string_property(client, peer, device_object, PropertyId::FirmwareRevision).await;
    info.app_software = read_string_property(
        client,
        peer,
        device_object,
        PropertyId::ApplicationSoftwareVersion,
    )
    .await;
    Ok(())
}

/// Read the objectList property of a device object.
async fn read_object_list(
    client: &mut BacnetClient,
    peer: SocketAddr,
    device_object: ObjectId,
) -> BacexResult<Vec<ObjectId>> {
    let ack = client
        .read_property(peer, device_object, PropertyId::ObjectList, None)
        .await?;
    let values = match ack.value {
        PropertyValue::List(items) => items,
        single => vec![single],
    };
    Ok(values
        .into_iter()
        .filter_map(|v| match v {
            PropertyValue::ObjectId(id) => Some(id),
            _ => None,
        })
        .collect())
}

async fn read_string_property_checked(
    client: &mut BacnetClient,
    peer: SocketAddr,
    object: ObjectId,
    property: PropertyId,
) -> BacexResult<Option<String>> {
    let ack = client.read_property(peer, object, property, None).await?;
    Ok(ack.value.as_string().map(str::to_string))
}

async fn read_string_property(
    client: &mut BacnetClient,
    peer: SocketAddr,
    object: ObjectId,
    property: PropertyId,
) -> Option<String> {
    read_string_property_checked(client, peer, object, property)
        .await
        .ok()
        .flatten()
}

/// Snapshot presentValue for the value-carrying objects of one device.
///
/// Failures are recorded as error samples so the snapshot is complete even
/// when individual points are unreadable.
async fn snapshot_present_values(
    client: &mut BacnetClient,
    peer: SocketAddr,
    device_id: u32,
    object_ids: &[ObjectId],
    store: &Store,
) -> BacexResult<usize> {
    let ts = utc_now_iso();
    let mut samples = Vec::new();
    for id in snapshot_candidates(object_ids) {
        let sample = match client
            .read_property(peer, id, PropertyId::PresentValue, None)
            .await
        {
            Ok(ack) => SampleInsert {
                ts_utc: ts.clone(),
                device_id: i64::from(device_id),
                obj_type: id.object_type.name(),
                obj_inst: id.instance,
                property: PropertyId::PresentValue.name(),
                value_raw: Some(ack.value.render()),
                quality: Some("snapshot".to_string()),
                msg: Some("read-property".to_string()),
            },
            Err(e) => SampleInsert {
                ts_utc: ts.clone(),
                device_id: i64::from(device_id),
                obj_type: id.object_type.name(),
                obj_inst: id.instance,
                property: PropertyId::PresentValue.name(),
                value_raw: None,
                quality: Some("snapshot".to_string()),
                msg: Some(format!("error: {e}")),
            },
        };
        samples.push(sample);
    }
    store.insert_samples(&samples)?;
    Ok(samples.len())
}

/// Sleep for `duration`, waking early when cancelled.
pub async fn sleep_cancellable(duration: Duration, cancel: &CancelFlag) {
    const STEP: Duration = Duration::from_millis(50);
    let mut remaining = duration;
    while !remaining.is_zero() {
        if cancel.load(Ordering::Relaxed) {
            return;
        }
        let step = remaining.min(STEP);
        tokio::time::sleep(step).await;
        remaining = remaining.saturating_sub(step);
    }
}

/// Snapshot filter applied to an inventoried object list.
pub fn snapshot_candidates(object_ids: &[ObjectId]) -> Vec<ObjectId> {
    object_ids
        .iter()
        .copied()
        .filter(|id| id.object_type.carries_present_value())
        .collect()
}
