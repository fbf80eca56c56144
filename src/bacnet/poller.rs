//! Extraction polling: scheduled reads of mapped points into `samples`.
//!
//! Each cycle binds its own socket, reads every map entry once, and appends
//! one sample row per point with quality `poll`. Point-level failures are
//! recorded as error samples; cycle-level failures are reported through the
//! progress callback and never kill the loop.

use crate::bacnet::client::{BacnetClient, BACNET_PORT_BASE};
use crate::bacnet::discovery::{sleep_cancellable, CancelFlag};
use crate::bacnet::map::MapEntry;
use crate::bacnet::{ObjectId, ObjectType, PropertyId};
use crate::core::config::NetworkConfig;
use crate::core::error::{BacexError, BacexResult};
use crate::storage::db::utc_now_iso;
use crate::storage::{SampleInsert, Store};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Progress events emitted by the poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PollEvent {
    PollPortSelected { port: u16, tried: Vec<u16> },
    PollCycleStart { points: usize },
    PollCycleDone { points: usize, read: usize, errors: usize },
    PollCycleError { error: String },
}

/// Counters for one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStats {
    pub points: usize,
    pub read: usize,
    pub errors: usize,
}

/// Run one poll cycle over the given map entries.
pub async fn run_once(
    net: &NetworkConfig,
    entries: &[MapEntry],
    store: &Store,
    progress: impl Fn(PollEvent),
) -> BacexResult<CycleStats> {
    progress(PollEvent::PollCycleStart {
        points: entries.len(),
    });
    if entries.is_empty() {
        return Ok(CycleStats::default());
    }

    store.ensure()?;

    let mut client = BacnetClient::bind(net).await?;
    let selection = client.port_selection().clone();
    progress(PollEvent::PollPortSelected {
        port: selection.port,
        tried: selection.tried,
    });

    let ts = utc_now_iso();
    let mut stats = CycleStats {
        points: entries.len(),
        ..CycleStats::default()
    };
    let mut samples = Vec::with_capacity(entries.len());

    for entry in entries {
        match poll_point(&mut client, store, entry, &ts).await {
            Ok(sample) => {
                samples.push(sample);
                stats.read += 1;
            }
            Err(PointFailure::Recorded(sample)) => {
                samples.push(sample);
                stats.errors += 1;
            }
            Err(PointFailure::Skipped) => {
                stats.errors += 1;
            }
            Err(PointFailure::Fatal(e)) => {
                store.insert_samples(&samples)?;
                return Err(e);
            }
        }
    }
    store.insert_samples(&samples)?;

    progress(PollEvent::PollCycleDone {
        points: stats.points,
        read: stats.read,
        errors: stats.errors,
    });
    Ok(stats)
}

/// Run poll cycles until cancelled.
///
/// The map file is re-read at the start of every cycle, so an updated
/// upload takes effect without restarting the loop.
pub async fn run_loop(
    net: &NetworkConfig,
    map_path: &std::path::Path,
    interval: Duration,
    store: &Store,
    progress: impl Fn(PollEvent),
    cancel: &CancelFlag,
) {
    loop {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        let cycle = match crate::bacnet::map::read_map_file(map_path) {
            Ok(entries) => run_once(net, &entries, store, &progress).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = cycle {
            tracing::warn!(error = %e, "poll cycle failed");
            progress(PollEvent::PollCycleError {
                error: e.to_string(),
            });
        }
        sleep_cancellable(interval.max(Duration::from_secs(1)), cancel).await;
        if cancel.load(Ordering::Relaxed) {
            break;
        }
    }
}

enum PointFailure {
    /// The failure was written down as an error sample.
    Recorded(SampleInsert),
    /// The point could not even be attributed to a device row.
    Skipped,
    /// The whole cycle should stop (socket-level failure).
    Fatal(BacexError),
}

async fn poll_point(
    client: &mut BacnetClient,
    store: &Store,
    entry: &MapEntry,
    ts: &str,
) -> Result<SampleInsert, PointFailure> {
    let sample_device_id = entry.device_id.map(i64::from).unwrap_or(-1);

    if entry.device_id.is_none() && entry.address.is_none() {
        return Err(PointFailure::Skipped);
    }

    // Explicit address wins; otherwise look the device up in the inventory.
    let address = match &entry.address {
        Some(addr) => Some(addr.clone()),
        None => match entry.device_id {
            Some(id) => store.resolve_address(id).unwrap_or_default(),
            None => None,
        },
    };
    let Some(address) = address else {
        return Err(PointFailure::Skipped);
    };
    let Some(peer) = parse_peer_address(&address) else {
        return Err(PointFailure::Recorded(error_sample(
            entry,
            sample_device_id,
            ts,
            format!("error: bad address {address}"),
        )));
    };

    let Some(obj_type) = ObjectType::parse(&entry.obj_type) else {
        return Err(PointFailure::Recorded(error_sample(
            entry,
            sample_device_id,
            ts,
            format!("error: unknown object type {}", entry.obj_type),
        )));
    };
    let Some(property) = PropertyId::parse(&entry.property) else {
        return Err(PointFailure::Recorded(error_sample(
            entry,
            sample_device_id,
            ts,
            "unreadable".to_string(),
        )));
    };

    let object = ObjectId::new(obj_type, entry.obj_inst);
    match client.read_property(peer, object, property, None).await {
        Ok(ack) => Ok(SampleInsert {
            ts_utc: ts.to_string(),
            device_id: sample_device_id,
            obj_type: entry.obj_type.clone(),
            obj_inst: entry.obj_inst,
            property: entry.property.clone(),
            value_raw: Some(ack.value.render()),
            quality: Some("poll".to_string()),
            msg: Some("read-property".to_string()),
        }),
        Err(e) if e.is_point_level() => Err(PointFailure::Recorded(error_sample(
            entry,
            sample_device_id,
            ts,
            format!("error: {e}"),
        ))),
        Err(e) => Err(PointFailure::Fatal(e)),
    }
}

fn error_sample(entry: &MapEntry, device_id: i64, ts: &str, msg: String) -> SampleInsert {
    SampleInsert {
        ts_utc: ts.to_string(),
        device_id,
        obj_type: entry.obj_type.clone(),
        obj_inst: entry.obj_inst,
        property: entry.property.clone(),
        value_raw: None,
        quality: Some("poll".to_string()),
        msg: Some(msg),
    }
}

/// Parse a stored peer address: `ip:port` or a bare IP on the standard
/// BACnet port.
pub fn parse_peer_address(address: &str) -> Option<SocketAddr> {
    if let Ok(sock) = address.parse::<SocketAddr>() {
        return Some(sock);
    }
    address
        .parse::<IpAddr>()
        .ok()
        .map(|ip| SocketAddr::new(ip, BACNET_PORT_BASE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_addresses_accept_bare_ips() {
        assert_eq!(
            parse_peer_address("192.168.1.40"),
            Some(SocketAddr::new("192.168.1.40".parse().unwrap(), 47808))
        );
        assert_eq!(
            parse_peer_address("192.168.1.40:47812"),
            Some("192.168.1.40:47812".parse().unwrap())
        );
        assert_eq!(parse_peer_address("office-controller"), None);
    }

    #[test]
    fn poll_events_serialize_with_event_tag() {
        let ev = PollEvent::PollCycleDone {
            points: 10,
            read: 8,
            errors: 2,
        };
        let json = serde_json::to_value(&ev).expect("serialize");
        assert_eq!(json["event"], "poll_cycle_done");
        assert_eq!(json["read"], 8);
    }
}
