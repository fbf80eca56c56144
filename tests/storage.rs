//! Storage layer tests: schema, upserts, queries, exports.

mod common;

use bacex::storage::db::utc_now_iso;
use bacex::storage::{export, SampleInsert, Store};

fn sample(device_id: i64, obj_inst: u32, quality: &str) -> SampleInsert {
    SampleInsert {
        ts_utc: utc_now_iso(),
        device_id,
        obj_type: "analogInput".to_string(),
        obj_inst,
        property: "presentValue".to_string(),
        value_raw: Some("21.5".to_string()),
        quality: Some(quality.to_string()),
        msg: Some("read-property".to_string()),
    }
}

#[test]
fn ensure_is_idempotent() {
    let (dir, store) = common::create_temp_store();
    store
        .upsert_device(&common::sample_device(10, "192.168.1.40:47808"), &utc_now_iso())
        .unwrap();

    // A second ensure must not disturb existing data.
    store.ensure().unwrap();
    assert_eq!(store.devices().unwrap().len(), 1);
    drop(dir);
}

#[test]
fn ensure_creates_parent_directories() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = Store::new(dir.path().join("nested").join("deep").join("topo.db"));
    assert!(!store.exists());
    store.ensure().unwrap();
    assert!(store.exists());
}

#[test]
fn device_upsert_refreshes_every_column() {
    let (_dir, store) = common::create_temp_store();

    store
        .upsert_device(&common::sample_device(12, "192.168.1.40:47808"), "t1")
        .unwrap();

    let mut updated = common::sample_device(12, "192.168.1.99:47808");
    updated.model_name = Some("AC-10".to_string());
    store.upsert_device(&updated, "t2").unwrap();

    let devices = store.devices().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].address, "192.168.1.99:47808");
    assert_eq!(devices[0].model_name.as_deref(), Some("AC-10"));
    assert_eq!(devices[0].last_seen_utc, "t2");
}

#[test]
fn duplicate_objects_are_ignored() {
    let (_dir, store) = common::create_temp_store();
    store
        .upsert_device(&common::sample_device(12, "192.168.1.40:47808"), "t1")
        .unwrap();

    let objects = vec![
        ("analogInput".to_string(), 1, Some("Zone Temp".to_string())),
        ("analogInput".to_string(), 2, None),
    ];
    store.insert_objects(12, &objects).unwrap();
    store.insert_objects(12, &objects).unwrap();

    assert_eq!(store.objects_for_device(12).unwrap().len(), 2);
}

#[test]
fn address_resolution() {
    let (_dir, store) = common::create_temp_store();
    store
        .upsert_device(&common::sample_device(31, "10.0.0.9:47808"), "t1")
        .unwrap();

    assert_eq!(
        store.resolve_address(31).unwrap().as_deref(),
        Some("10.0.0.9:47808")
    );
    assert_eq!(store.resolve_address(32).unwrap(), None);
}

#[test]
fn samples_are_ordered_and_limited() {
    let (_dir, store) = common::create_temp_store();

    let mut batch = Vec::new();
    for i in 0..5 {
        let mut s = sample(7, i, "poll");
        s.ts_utc = format!("2026-01-01T00:00:0{i}Z");
        batch.push(s);
    }
    store.insert_samples(&batch).unwrap();

    let newest = store.samples(Some(7), Some(2)).unwrap();
    assert_eq!(newest.len(), 2);
    assert_eq!(newest[0].ts_utc, "2026-01-01T00:00:04Z");

    let all = store.samples(None, None).unwrap();
    assert_eq!(all.len(), 5);
}

#[test]
fn error_samples_keep_null_values() {
    let (_dir, store) = common::create_temp_store();
    let mut errored = sample(-1, 3, "poll");
    errored.value_raw = None;
    errored.msg = Some("error: read timed out".to_string());
    store.insert_sample(&errored).unwrap();

    let rows = store.samples(None, None).unwrap();
    assert_eq!(rows[0].device_id, -1);
    assert_eq!(rows[0].value_raw, None);
    assert!(rows[0].msg.as_deref().unwrap().starts_with("error:"));
}

#[test]
fn points_join_devices_with_objects() {
    let (_dir, store) = common::create_temp_store();
    store
        .upsert_device(&common::sample_device(12, "192.168.1.40:47808"), "t1")
        .unwrap();
    store
        .insert_objects(
            12,
            &[("analogInput".to_string(), 1, Some("Zone Temp".to_string()))],
        )
        .unwrap();

    let points = store.points(None).unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].vendor, "Acme Controls");
    assert_eq!(points[0].obj_name, "Zone Temp");

    assert_eq!(store.points(Some(12)).unwrap().len(), 1);
    assert_eq!(store.points(Some(99)).unwrap().len(), 0);
}

#[test]
fn object_counts_label_devices() {
    let (_dir, store) = common::create_temp_store();
    store
        .upsert_device(&common::sample_device(12, "192.168.1.40:47808"), "t1")
        .unwrap();
    store
        .insert_objects(
            12,
            &[
                ("analogInput".to_string(), 1, None),
                ("binaryValue".to_string(), 2, None),
            ],
        )
        .unwrap();

    let counts = store.object_counts().unwrap();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].count, 2);
    assert!(counts[0].label.contains("Acme Controls"));
}

#[test]
fn exports_match_stored_rows() {
    let (_dir, store) = common::create_temp_store();
    store
        .upsert_device(&common::sample_device(12, "192.168.1.40:47808"), "t1")
        .unwrap();
    store
        .insert_objects(12, &[("analogInput".to_string(), 1, None)])
        .unwrap();
    store.insert_sample(&sample(12, 1, "snapshot")).unwrap();

    let devices_csv = export::devices_csv(&store.devices().unwrap());
    assert!(devices_csv.starts_with("device_id,address,"));
    assert!(devices_csv.contains("192.168.1.40:47808"));

    let points_csv = export::points_csv(&store.points(None).unwrap());
    assert_eq!(points_csv.lines().count(), 2);

    let samples_csv = export::samples_csv(&store.samples(None, None).unwrap());
    assert!(samples_csv.contains("snapshot"));
}
