//! SQLite topology store.
//!
//! Schema and access paths for the three tables the gateway maintains:
//! `devices` (one row per discovered device, upserted), `objects` (the
//! inventoried object lists), and `samples` (append-only value history from
//! snapshots and poll cycles). Connections are opened per operation; WAL
//! mode keeps readers and the single writer out of each other's way.

use crate::bacnet::DeviceInfo;
use crate::core::error::BacexResult;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Schema DDL, applied idempotently before first use.
const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS devices (
    device_id      INTEGER PRIMARY KEY,
    address        TEXT NOT NULL,
    max_apdu       INTEGER,
    segmentation   TEXT,
    vendor_id      INTEGER,
    vendor_name    TEXT,
    model_name     TEXT,
    firmware_rev   TEXT,
    app_software   TEXT,
    last_seen_utc  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS objects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    device_id   INTEGER NOT NULL,
    obj_type    TEXT NOT NULL,
    obj_inst    INTEGER NOT NULL,
    obj_name    TEXT,
    UNIQUE(device_id, obj_type, obj_inst)
);

CREATE TABLE IF NOT EXISTS samples (
    ts_utc      TEXT NOT NULL,
    device_id   INTEGER NOT NULL,
    obj_type    TEXT NOT NULL,
    obj_inst    INTEGER NOT NULL,
    property    TEXT NOT NULL,
    value_raw   TEXT,
    quality     TEXT,
    msg         TEXT
);

CREATE INDEX IF NOT EXISTS idx_objects_device_id ON objects(device_id);
CREATE INDEX IF NOT EXISTS idx_samples_device_ts ON samples(device_id, ts_utc);
";

/// A `devices` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRow {
    pub device_id: u32,
    pub address: String,
    pub max_apdu: Option<u32>,
    pub segmentation: Option<String>,
    pub vendor_id: Option<u32>,
    pub vendor_name: Option<String>,
    pub model_name: Option<String>,
    pub firmware_rev: Option<String>,
    pub app_software: Option<String>,
    pub last_seen_utc: String,
}

/// An `objects` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRow {
    pub device_id: u32,
    pub obj_type: String,
    pub obj_inst: u32,
    pub obj_name: Option<String>,
}

/// An inventoried point: an object joined with its device's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointRow {
    pub device_id: u32,
    pub address: String,
    pub vendor: String,
    pub model: String,
    pub obj_type: String,
    pub obj_inst: u32,
    pub obj_name: String,
}

/// A `samples` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleRow {
    pub ts_utc: String,
    pub device_id: i64,
    pub obj_type: String,
    pub obj_inst: u32,
    pub property: String,
    pub value_raw: Option<String>,
    pub quality: Option<String>,
    pub msg: Option<String>,
}

/// A sample about to be inserted.
#[derive(Debug, Clone)]
pub struct SampleInsert {
    pub ts_utc: String,
    pub device_id: i64,
    pub obj_type: String,
    pub obj_inst: u32,
    pub property: String,
    pub value_raw: Option<String>,
    pub quality: Option<String>,
    pub msg: Option<String>,
}

/// Per-device object count for the overview chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectCountRow {
    pub device_id: u32,
    pub label: String,
    pub count: u32,
}

/// Handle on the topology database. Cheap to clone; connections are opened
/// per operation.
#[derive(Debug, Clone)]
pub struct Store {
    db_path: PathBuf,
}

impl Store {
    /// Create a handle for the database at `db_path`.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    /// The database path.
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Whether the database file already exists.
    pub fn exists(&self) -> bool {
        self.db_path.exists()
    }

    /// Create the parent directory and apply the schema. Idempotent:
    /// re-running against an existing database changes nothing.
    pub fn ensure(&self) -> BacexResult<()> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = self.connect()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn connect(&self) -> BacexResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(conn)
    }

    /// Insert or update a device row, refreshing every column.
    pub fn upsert_device(&self, info: &DeviceInfo, last_seen_utc: &str) -> BacexResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO devices(device_id, address, max_apdu, segmentation, vendor_id,
                                 vendor_name, model_name, firmware_rev, app_software, last_seen_utc)
             VALUES(?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
             ON CONFLICT(device_id) DO UPDATE SET
               address=excluded.address,
               max_apdu=excluded.max_apdu,
               segmentation=excluded.segmentation,
               vendor_id=excluded.vendor_id,
               vendor_name=excluded.vendor_name,
               model_name=excluded.model_name,
               firmware_rev=excluded.firmware_rev,
               app_software=excluded.app_software,
               last_seen_utc=excluded.last_seen_utc",
            params![
                info.device_id,
                info.address,
                info.max_apdu,
                info.segmentation.map(|s| s.name().to_string()),
                info.vendor_id,
                info.vendor_name,
                info.model_name,
                info.firmware_rev,
                info.app_software,
                last_seen_utc,
            ],
        )?;
        Ok(())
    }

    /// Insert inventoried objects for a device; duplicates are ignored.
    /// Returns the number of rows offered (the inventory count).
    pub fn insert_objects(
        &self,
        device_id: u32,
        objects: &[(String, u32, Option<String>)],
    ) -> BacexResult<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO objects(device_id, obj_type, obj_inst, obj_name)
                 VALUES(?1,?2,?3,?4)",
            )?;
            for (obj_type, obj_inst, obj_name) in objects {
                stmt.execute(params![device_id, obj_type, obj_inst, obj_name])?;
            }
        }
        tx.commit()?;
        Ok(objects.len())
    }

    /// Append one sample row.
    pub fn insert_sample(&self, sample: &SampleInsert) -> BacexResult<()> {
        let conn = self.connect()?;
        insert_sample_on(&conn, sample)?;
        Ok(())
    }

    /// Append a batch of sample rows in one transaction.
    pub fn insert_samples(&self, samples: &[SampleInsert]) -> BacexResult<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        for sample in samples {
            insert_sample_on(&tx, sample)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Look up the stored address for a device.
    pub fn resolve_address(&self, device_id: u32) -> BacexResult<Option<String>> {
        let conn = self.connect()?;
        let addr = conn
            .query_row(
                "SELECT address FROM devices WHERE device_id=?1",
                params![device_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(addr)
    }

    /// All devices, ordered by device id.
    pub fn devices(&self) -> BacexResult<Vec<DeviceRow>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT device_id, address, max_apdu, segmentation, vendor_id, vendor_name,
                    model_name, firmware_rev, app_software, last_seen_utc
             FROM devices ORDER BY device_id",
        )?;
        let rows = stmt
            .query_map([], device_row_from)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// One device by id.
    pub fn device(&self, device_id: u32) -> BacexResult<Option<DeviceRow>> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT device_id, address, max_apdu, segmentation, vendor_id, vendor_name,
                        model_name, firmware_rev, app_software, last_seen_utc
                 FROM devices WHERE device_id=?1",
                params![device_id],
                device_row_from,
            )
            .optional()?;
        Ok(row)
    }

    /// Objects for one device, ordered by type then instance.
    pub fn objects_for_device(&self, device_id: u32) -> BacexResult<Vec<ObjectRow>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT device_id, obj_type, obj_inst, obj_name
             FROM objects WHERE device_id=?1 ORDER BY obj_type, obj_inst",
        )?;
        let rows = stmt
            .query_map(params![device_id], |row| {
                Ok(ObjectRow {
                    device_id: row.get(0)?,
                    obj_type: row.get(1)?,
                    obj_inst: row.get(2)?,
                    obj_name: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// All inventoried points, optionally restricted to one device.
    pub fn points(&self, device_id: Option<u32>) -> BacexResult<Vec<PointRow>> {
        let conn = self.connect()?;
        let sql = "SELECT o.device_id,
                          COALESCE(d.address, ''),
                          COALESCE(d.vendor_name, ''),
                          COALESCE(d.model_name, ''),
                          o.obj_type,
                          o.obj_inst,
                          COALESCE(o.obj_name, '')
                   FROM objects o
                   LEFT JOIN devices d ON d.device_id = o.device_id";
        let map = |row: &rusqlite::Row<'_>| {
            Ok(PointRow {
                device_id: row.get(0)?,
                address: row.get(1)?,
                vendor: row.get(2)?,
                model: row.get(3)?,
                obj_type: row.get(4)?,
                obj_inst: row.get(5)?,
                obj_name: row.get(6)?,
            })
        };
        let rows = match device_id {
            Some(id) => {
                let mut stmt = conn.prepare(&format!(
                    "{sql} WHERE o.device_id = ?1 ORDER BY o.obj_type, o.obj_inst"
                ))?;
                let rows = stmt
                    .query_map(params![id], map)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "{sql} ORDER BY o.device_id, o.obj_type, o.obj_inst"
                ))?;
                let rows = stmt.query_map([], map)?.collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }

    /// Samples, newest first, optionally restricted to one device and
    /// optionally truncated to the most recent `limit` rows.
    pub fn samples(
        &self,
        device_id: Option<u32>,
        limit: Option<u32>,
    ) -> BacexResult<Vec<SampleRow>> {
        let conn = self.connect()?;
        let mut sql = String::from(
            "SELECT ts_utc, device_id, obj_type, obj_inst, property, value_raw, quality, msg
             FROM samples",
        );
        if device_id.is_some() {
            sql.push_str(" WHERE device_id = ?1");
        }
        sql.push_str(" ORDER BY ts_utc DESC");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        let map = |row: &rusqlite::Row<'_>| {
            Ok(SampleRow {
                ts_utc: row.get(0)?,
                device_id: row.get(1)?,
                obj_type: row.get(2)?,
                obj_inst: row.get(3)?,
                property: row.get(4)?,
                value_raw: row.get(5)?,
                quality: row.get(6)?,
                msg: row.get(7)?,
            })
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = match device_id {
            Some(id) => stmt
                .query_map(params![id], map)?
                .collect::<Result<Vec<_>, _>>()?,
            None => stmt.query_map([], map)?.collect::<Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }

    /// Object counts per device, labeled for the overview chart.
    pub fn object_counts(&self) -> BacexResult<Vec<ObjectCountRow>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT d.device_id, COALESCE(d.vendor_name,''), COALESCE(d.model_name,''), COUNT(o.id)
             FROM devices d LEFT JOIN objects o ON d.device_id = o.device_id
             GROUP BY d.device_id, d.vendor_name, d.model_name
             ORDER BY d.device_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let device_id: u32 = row.get(0)?;
                let vendor: String = row.get(1)?;
                let model: String = row.get(2)?;
                let count: u32 = row.get(3)?;
                Ok(ObjectCountRow {
                    device_id,
                    label: format!("{device_id} {vendor} {model}").trim().to_string(),
                    count,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn insert_sample_on(conn: &Connection, sample: &SampleInsert) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO samples(ts_utc, device_id, obj_type, obj_inst, property, value_raw, quality, msg)
         VALUES(?1,?2,?3,?4,?5,?6,?7,?8)",
        params![
            sample.ts_utc,
            sample.device_id,
            sample.obj_type,
            sample.obj_inst,
            sample.property,
            sample.value_raw,
            sample.quality,
            sample.msg,
        ],
    )?;
    Ok(())
}

fn device_row_from(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeviceRow> {
    Ok(DeviceRow {
        device_id: row.get(0)?,
        address: row.get(1)?,
        max_apdu: row.get(2)?,
        segmentation: row.get(3)?,
        vendor_id: row.get(4)?,
        vendor_name: row.get(5)?,
        model_name: row.get(6)?,
        firmware_rev: row.get(7)?,
        app_software: row.get(8)?,
        last_seen_utc: row.get(9)?,
    })
}

/// Current UTC timestamp in the ISO-8601 form stored throughout the schema.
pub fn utc_now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}
