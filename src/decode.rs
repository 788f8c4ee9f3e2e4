//! FIT activity trace decoding.
//!
//! Extracts GPS points from FIT `record` messages. Positions in FIT files are
//! stored as signed 32-bit "semicircles" where the full integer range spans
//! ±180°. Records without a position fix (treadmill segments, satellite
//! dropouts) are valid and simply contribute no point.

use std::path::Path;

use fitparser::de::from_bytes;
use fitparser::profile::MesgNum;
use fitparser::{FitDataRecord, Value};
use log::{debug, warn};

use crate::error::{Result, TrackerError};
use crate::GeoPoint;

/// Degrees per semicircle unit: 180° / 2^31.
pub const SEMICIRCLES_TO_DEGREES: f64 = 180.0 / 2_147_483_648.0;

/// Suffix token some exporters add between the activity id and the
/// `.fit` extension.
const ACTIVITY_SUFFIX: &str = "_ACTIVITY";

/// Convert a raw semicircle angle to degrees.
///
/// Takes an `i64` so the ±2^31 endpoints map exactly to ±180.0; actual FIT
/// position fields always fit in an `i32`.
pub fn semicircles_to_degrees(raw: i64) -> f64 {
    raw as f64 * SEMICIRCLES_TO_DEGREES
}

/// Derive the activity identifier from a trace file name.
///
/// Uses the file stem and strips the fixed `_ACTIVITY` suffix when present:
/// `12345678_ACTIVITY.fit` and `12345678.fit` both yield `12345678`.
pub fn activity_id_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let id = stem.strip_suffix(ACTIVITY_SUFFIX).unwrap_or(stem);
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Decode a FIT trace file into GPS points tagged with the given activity
/// id and sport label.
///
/// Pure read: never touches the point store. A malformed container yields
/// `TrackerError::Decode`; records without both position fields are
/// silently skipped.
pub fn decode_trace(path: &Path, activity_id: &str, sport: &str) -> Result<Vec<GeoPoint>> {
    let bytes = std::fs::read(path).map_err(|e| TrackerError::Decode {
        activity_id: activity_id.to_string(),
        message: e.to_string(),
    })?;

    let records = from_bytes(&bytes).map_err(|e| TrackerError::Decode {
        activity_id: activity_id.to_string(),
        message: e.to_string(),
    })?;

    let mut points = Vec::new();
    for record in &records {
        if record.kind() != MesgNum::Record {
            continue;
        }
        let Some((lat_raw, lon_raw)) = position_fix(record) else {
            continue;
        };
        let point = GeoPoint::new(
            semicircles_to_degrees(lat_raw as i64),
            semicircles_to_degrees(lon_raw as i64),
            activity_id,
            sport,
        );
        if point.is_valid() {
            points.push(point);
        } else {
            warn!(
                "Dropping out-of-range fix ({}, {}) in activity {}",
                point.latitude, point.longitude, activity_id
            );
        }
    }

    debug!(
        "Decoded {} points from activity {} ({} messages)",
        points.len(),
        activity_id,
        records.len()
    );
    Ok(points)
}

/// Extract the raw semicircle position from a record message, if it carries
/// one. Both fields must be present for the record to count as a fix.
fn position_fix(record: &FitDataRecord) -> Option<(i32, i32)> {
    let mut lat = None;
    let mut lon = None;
    for field in record.fields() {
        match field.name() {
            "position_lat" => lat = semicircle_value(field.value()),
            "position_long" => lon = semicircle_value(field.value()),
            _ => {}
        }
    }
    Some((lat?, lon?))
}

fn semicircle_value(value: &Value) -> Option<i32> {
    match value {
        Value::SInt32(v) => Some(*v),
        _ => None,
    }
}
