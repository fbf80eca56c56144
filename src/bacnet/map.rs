//! Extraction maps: the operator-supplied point lists the poller reads.
//!
//! A map is a CSV file stored as `data/extraction_map_<project>.csv`. The
//! reader is deliberately tolerant: header names have aliases, rows missing
//! the object coordinates are skipped, and a bad device id only downgrades
//! the row to address-less (resolved later against the devices table).

use crate::core::error::{BacexError, BacexResult};
use std::path::{Path, PathBuf};

/// File-name prefix for stored maps.
pub const MAP_FILE_PREFIX: &str = "extraction_map_";

/// One point to poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    /// Device instance, when the row names one.
    pub device_id: Option<u32>,
    /// Explicit peer address, when the row carries one.
    pub address: Option<String>,
    /// Object type spelling as written in the map.
    pub obj_type: String,
    /// Object instance number.
    pub obj_inst: u32,
    /// Property name; defaults to presentValue.
    pub property: String,
    /// Optional operator tag for the point.
    pub tag: Option<String>,
}

/// Parse map content. Unusable rows are skipped, never fatal.
pub fn parse_map(content: &str) -> Vec<MapEntry> {
    let mut lines = content.lines();
    let Some(header_line) = lines.next() else {
        return Vec::new();
    };
    let header: Vec<String> = split_csv_line(header_line)
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();

    let device_col = find_column(&header, &["device_id", "DeviceId", "device"]);
    let address_col = find_column(&header, &["address", "Address"]);
    let type_col = find_column(&header, &["obj_type", "object_type", "type"]);
    let inst_col = find_column(&header, &["obj_inst", "object_instance", "instance"]);
    let prop_col = find_column(&header, &["property", "prop"]);
    let tag_col = find_column(&header, &["tag", "name"]);

    let mut entries = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_csv_line(line);
        let get = |col: Option<usize>| -> Option<String> {
            let value = fields.get(col?)?.trim();
            if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            }
        };

        let Some(obj_type) = get(type_col) else {
            continue;
        };
        let Some(obj_inst) = get(inst_col).and_then(|v| v.parse::<u32>().ok()) else {
            continue;
        };

        entries.push(MapEntry {
            device_id: get(device_col).and_then(|v| v.parse::<u32>().ok()),
            address: get(address_col),
            obj_type,
            obj_inst,
            property: get(prop_col).unwrap_or_else(|| "presentValue".to_string()),
            tag: get(tag_col),
        });
    }
    entries
}

/// Read and parse a map file.
pub fn read_map_file(path: &Path) -> BacexResult<Vec<MapEntry>> {
    let content = std::fs::read_to_string(path).map_err(|e| BacexError::InvalidMap {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(parse_map(&content))
}

/// Restrict a project name to alphanumerics, `-`, and `_`.
pub fn sanitize_project(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

/// Storage path for a project's map.
pub fn map_path(data_dir: &Path, project: &str) -> PathBuf {
    data_dir.join(format!("{MAP_FILE_PREFIX}{project}.csv"))
}

/// Recover the project name from a stored map path.
pub fn project_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    stem.strip_prefix(MAP_FILE_PREFIX).map(str::to_string)
}

/// All stored maps in the data directory, sorted by file name.
pub fn list_map_files(data_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(data_dir) else {
        return Vec::new();
    };
    let mut maps: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension().is_some_and(|ext| ext == "csv")
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(MAP_FILE_PREFIX))
        })
        .collect();
    maps.sort();
    maps
}

/// Find the index of the first header cell matching one of the aliases.
fn find_column(header: &[String], aliases: &[&str]) -> Option<usize> {
    header
        .iter()
        .position(|h| aliases.iter().any(|a| h == a))
}

/// Split one CSV line, honoring double-quoted fields.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
