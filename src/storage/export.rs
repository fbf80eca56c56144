//! CSV rendering for the data-export endpoints.
//!
//! Column order matches the JSON export shapes so a downloaded CSV and the
//! corresponding JSON document describe identical tables.

use crate::storage::db::{DeviceRow, ObjectRow, PointRow, SampleRow};

/// Escape one CSV field, quoting when it contains a delimiter, quote, or
/// line break.
fn field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn row(fields: &[String]) -> String {
    let mut line = fields
        .iter()
        .map(|f| field(f))
        .collect::<Vec<_>>()
        .join(",");
    line.push_str("\r\n");
    line
}

fn opt_u32(value: Option<u32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn opt_str(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

/// Render the devices table.
pub fn devices_csv(rows: &[DeviceRow]) -> String {
    let mut out = row(&[
        "device_id".into(),
        "address".into(),
        "vendor_name".into(),
        "model_name".into(),
        "vendor_id".into(),
        "max_apdu".into(),
        "segmentation".into(),
        "firmware_rev".into(),
        "app_software".into(),
        "last_seen_utc".into(),
    ]);
    for r in rows {
        out.push_str(&row(&[
            r.device_id.to_string(),
            r.address.clone(),
            opt_str(&r.vendor_name),
            opt_str(&r.model_name),
            opt_u32(r.vendor_id),
            opt_u32(r.max_apdu),
            opt_str(&r.segmentation),
            opt_str(&r.firmware_rev),
            opt_str(&r.app_software),
            r.last_seen_utc.clone(),
        ]));
    }
    out
}

/// Render the points table (objects joined with device identity).
pub fn points_csv(rows: &[PointRow]) -> String {
    let mut out = row(&[
        "device_id".into(),
        "address".into(),
        "vendor".into(),
        "model".into(),
        "obj_type".into(),
        "obj_inst".into(),
        "obj_name".into(),
    ]);
    for r in rows {
        out.push_str(&row(&[
            r.device_id.to_string(),
            r.address.clone(),
            r.vendor.clone(),
            r.model.clone(),
            r.obj_type.clone(),
            r.obj_inst.to_string(),
            r.obj_name.clone(),
        ]));
    }
    out
}

/// Render a bare objects table for one device.
pub fn objects_csv(rows: &[ObjectRow]) -> String {
    let mut out = row(&[
        "device_id".into(),
        "obj_type".into(),
        "obj_inst".into(),
        "obj_name".into(),
    ]);
    for r in rows {
        out.push_str(&row(&[
            r.device_id.to_string(),
            r.obj_type.clone(),
            r.obj_inst.to_string(),
            opt_str(&r.obj_name),
        ]));
    }
    out
}

/// Render the samples table.
pub fn samples_csv(rows: &[SampleRow]) -> String {
    let mut out = row(&[
        "ts_utc".into(),
        "device_id".into(),
        "obj_type".into(),
        "obj_inst".into(),
        "property".into(),
        "value_raw".into(),
        "quality".into(),
        "msg".into(),
    ]);
    for r in rows {
        out.push_str(&row(&[
            r.ts_utc.clone(),
            r.device_id.to_string(),
            r.obj_type.clone(),
            r.obj_inst.to_string(),
            r.property.clone(),
            opt_str(&r.value_raw),
            opt_str(&r.quality),
            opt_str(&r.msg),
        ]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_with_delimiters_are_quoted() {
        assert_eq!(field("plain"), "plain");
        assert_eq!(field("a,b"), "\"a,b\"");
        assert_eq!(field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn points_csv_has_header_and_rows() {
        let rows = vec![PointRow {
            device_id: 12,
            address: "192.168.1.40:47808".into(),
            vendor: "Acme Controls".into(),
            model: "AC-9".into(),
            obj_type: "analogInput".into(),
            obj_inst: 3,
            obj_name: "Zone Temp, East".into(),
        }];
        let csv = points_csv(&rows);
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("device_id,address,vendor,model,obj_type,obj_inst,obj_name")
        );
        assert_eq!(
            lines.next(),
            Some("12,192.168.1.40:47808,Acme Controls,AC-9,analogInput,3,\"Zone Temp, East\"")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn empty_tables_render_header_only() {
        let csv = samples_csv(&[]);
        assert_eq!(csv.lines().count(), 1);
    }
}
