//! Per-user point store: an append-only CSV of decoded GPS points.
//!
//! One file per user, one row per point, canonical columns
//! `lat,lon,activity_id,sport` with no header. The store is a set keyed by
//! activity id, not a log: row order carries no meaning, and appending an
//! activity that is already present is a no-op.
//!
//! Files written before the sport column existed carry 3-column rows. Those
//! remain readable (normalized at parse time, never dropped) and the whole
//! file is compacted to the canonical schema the next time rows are merged
//! into it.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::{Result, TrackerError};
use crate::GeoPoint;

/// File name of the point store within a user's partition directory.
pub const STORE_FILE_NAME: &str = "gps_points.csv";

/// Sport label assigned to legacy rows when no filter supplies one.
const UNKNOWN_SPORT: &str = "unknown";

/// Append-only, deduplicated point store partitioned per user.
#[derive(Debug, Clone)]
pub struct PointStore {
    root: PathBuf,
}

/// One parsed store row. Legacy rows predate the sport column and are kept
/// as their own variant so the compatibility rules live in one place.
#[derive(Debug, Clone)]
enum StoredRow {
    Canonical(GeoPoint),
    Legacy {
        latitude: f64,
        longitude: f64,
        activity_id: String,
    },
}

impl StoredRow {
    fn parse(record: &csv::StringRecord) -> Result<Self> {
        match record.len() {
            4 => Ok(StoredRow::Canonical(GeoPoint::new(
                coord_field(record, 0)?,
                coord_field(record, 1)?,
                text_field(record, 2),
                text_field(record, 3),
            ))),
            3 => Ok(StoredRow::Legacy {
                latitude: coord_field(record, 0)?,
                longitude: coord_field(record, 1)?,
                activity_id: text_field(record, 2).to_string(),
            }),
            n => Err(TrackerError::Storage {
                message: format!("malformed point row with {} fields", n),
            }),
        }
    }

    fn activity_id(&self) -> &str {
        match self {
            StoredRow::Canonical(p) => &p.activity_id,
            StoredRow::Legacy { activity_id, .. } => activity_id,
        }
    }

    fn is_legacy(&self) -> bool {
        matches!(self, StoredRow::Legacy { .. })
    }

    /// Normalize into the canonical record, filling the missing sport on
    /// legacy rows from the given fallback.
    fn normalize(self, fallback_sport: &str) -> GeoPoint {
        match self {
            StoredRow::Canonical(p) => p,
            StoredRow::Legacy {
                latitude,
                longitude,
                activity_id,
            } => GeoPoint::new(latitude, longitude, &activity_id, fallback_sport),
        }
    }
}

impl PointStore {
    /// Create a store rooted at the given directory. Nothing is touched on
    /// disk until the first append.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of a user's point store file.
    pub fn user_file(&self, user: &str) -> PathBuf {
        self.root.join(user).join(STORE_FILE_NAME)
    }

    /// Whether any rows for this activity are already stored for the user.
    pub fn has(&self, user: &str, activity_id: &str) -> Result<bool> {
        let path = self.user_file(user);
        if !path.exists() {
            return Ok(false);
        }
        let rows = read_rows(&path)?;
        Ok(rows.iter().any(|r| r.activity_id() == activity_id))
    }

    /// Append decoded points for a user, returning the number of rows
    /// written.
    ///
    /// Idempotent per activity: points whose activity id is already stored
    /// are dropped, so re-processing a trace file is a no-op. An empty input
    /// writes nothing and creates no file. If the existing file still holds
    /// legacy 3-column rows, it is compacted to the canonical schema before
    /// the new rows land.
    pub fn append(&self, user: &str, points: &[GeoPoint]) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }

        let path = self.user_file(user);
        let existing = if path.exists() {
            read_rows(&path)?
        } else {
            Vec::new()
        };

        let existing_ids: HashSet<&str> = existing.iter().map(|r| r.activity_id()).collect();
        let fresh: Vec<&GeoPoint> = points
            .iter()
            .filter(|p| !existing_ids.contains(p.activity_id.as_str()))
            .collect();
        if fresh.is_empty() {
            debug!("All {} points already stored for user {}", points.len(), user);
            return Ok(0);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TrackerError::Storage {
                message: format!("cannot create {}: {}", parent.display(), e),
            })?;
        }

        if existing.iter().any(StoredRow::is_legacy) {
            warn!(
                "Store for user {} holds rows without a sport column; compacting to the current schema",
                user
            );
            self.compact_and_append(&path, existing, &fresh)?;
        } else {
            let file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(&path)
                .map_err(|e| TrackerError::Storage {
                    message: format!("cannot open {}: {}", path.display(), e),
                })?;
            let mut writer = csv::WriterBuilder::new().from_writer(file);
            for point in &fresh {
                write_point(&mut writer, point)?;
            }
            writer.flush().map_err(|e| TrackerError::Storage {
                message: e.to_string(),
            })?;
        }

        info!("Wrote {} points for user {}", fresh.len(), user);
        Ok(fresh.len())
    }

    /// Load every stored point for a user, optionally filtered by sport.
    ///
    /// Legacy rows have no sport column and always pass the filter, taking
    /// the filter value as their sport (or "unknown" on unfiltered reads).
    /// A store that does not exist yet reads as empty.
    pub fn load_all(&self, user: &str, sport_filter: Option<&str>) -> Result<Vec<GeoPoint>> {
        let path = self.user_file(user);
        if !path.exists() {
            debug!("No point store yet for user {}", user);
            return Ok(Vec::new());
        }

        let rows = read_rows(&path)?;
        let legacy_count = rows.iter().filter(|r| r.is_legacy()).count();
        if legacy_count > 0 {
            warn!(
                "{} rows for user {} predate the sport column and load unfiltered",
                legacy_count, user
            );
        }

        let fallback = sport_filter.unwrap_or(UNKNOWN_SPORT);
        let points = rows
            .into_iter()
            .filter(|row| match (row, sport_filter) {
                (StoredRow::Canonical(p), Some(sport)) => p.sport == sport,
                _ => true,
            })
            .map(|row| row.normalize(fallback))
            .collect();
        Ok(points)
    }

    /// Rewrite the whole file with normalized rows plus the new points,
    /// then swap it into place.
    fn compact_and_append(
        &self,
        path: &Path,
        existing: Vec<StoredRow>,
        fresh: &[&GeoPoint],
    ) -> Result<()> {
        let tmp = path.with_extension("csv.tmp");
        {
            let file = File::create(&tmp).map_err(|e| TrackerError::Storage {
                message: format!("cannot create {}: {}", tmp.display(), e),
            })?;
            let mut writer = csv::WriterBuilder::new().from_writer(file);
            for row in existing {
                write_point(&mut writer, &row.normalize(UNKNOWN_SPORT))?;
            }
            for point in fresh {
                write_point(&mut writer, point)?;
            }
            writer.flush().map_err(|e| TrackerError::Storage {
                message: e.to_string(),
            })?;
        }
        std::fs::rename(&tmp, path).map_err(|e| TrackerError::Storage {
            message: format!("cannot replace {}: {}", path.display(), e),
        })
    }
}

fn text_field(record: &csv::StringRecord, idx: usize) -> &str {
    record.get(idx).unwrap_or("").trim()
}

fn coord_field(record: &csv::StringRecord, idx: usize) -> Result<f64> {
    let raw = text_field(record, idx);
    raw.parse::<f64>().map_err(|e| TrackerError::Storage {
        message: format!("bad coordinate '{}': {}", raw, e),
    })
}

fn read_rows(path: &Path) -> Result<Vec<StoredRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| TrackerError::Storage {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| TrackerError::Storage {
            message: e.to_string(),
        })?;
        if record.len() == 1 && record.get(0).unwrap_or("").trim().is_empty() {
            continue;
        }
        rows.push(StoredRow::parse(&record)?);
    }
    Ok(rows)
}

fn write_point<W: std::io::Write>(writer: &mut csv::Writer<W>, point: &GeoPoint) -> Result<()> {
    writer
        .write_record([
            point.latitude.to_string().as_str(),
            point.longitude.to_string().as_str(),
            point.activity_id.as_str(),
            point.sport.as_str(),
        ])
        .map_err(|e| TrackerError::Storage {
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_points(activity_id: &str) -> Vec<GeoPoint> {
        vec![
            GeoPoint::new(52.0, 5.0, activity_id, "cycling"),
            GeoPoint::new(52.5, 5.5, activity_id, "cycling"),
        ]
    }

    #[test]
    fn test_append_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = PointStore::new(dir.path());

        let written = store.append("alice", &sample_points("100")).unwrap();
        assert_eq!(written, 2);

        let loaded = store.load_all("alice", None).unwrap();
        assert_eq!(loaded, sample_points("100"));
    }

    #[test]
    fn test_append_is_idempotent_per_activity() {
        let dir = tempfile::tempdir().unwrap();
        let store = PointStore::new(dir.path());

        assert_eq!(store.append("alice", &sample_points("100")).unwrap(), 2);
        assert_eq!(store.append("alice", &sample_points("100")).unwrap(), 0);
        assert!(store.has("alice", "100").unwrap());

        let loaded = store.load_all("alice", None).unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_empty_append_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = PointStore::new(dir.path());

        assert_eq!(store.append("alice", &[]).unwrap(), 0);
        assert!(!store.user_file("alice").exists());
        assert!(!store.has("alice", "100").unwrap());
    }

    #[test]
    fn test_missing_store_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = PointStore::new(dir.path());
        assert!(store.load_all("nobody", None).unwrap().is_empty());
    }

    #[test]
    fn test_sport_filter() {
        let dir = tempfile::tempdir().unwrap();
        let store = PointStore::new(dir.path());

        store
            .append("alice", &[GeoPoint::new(52.0, 5.0, "100", "cycling")])
            .unwrap();
        store
            .append("alice", &[GeoPoint::new(51.0, 4.0, "200", "running")])
            .unwrap();

        let cycling = store.load_all("alice", Some("cycling")).unwrap();
        assert_eq!(cycling.len(), 1);
        assert_eq!(cycling[0].activity_id, "100");

        let all = store.load_all("alice", None).unwrap();
        assert_eq!(all.len(), 2);
    }

    fn write_legacy_file(store: &PointStore, user: &str) {
        let path = store.user_file(user);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut f = File::create(&path).unwrap();
        writeln!(f, "52.1,5.1,7").unwrap();
        writeln!(f, "52.2,5.2,7").unwrap();
    }

    #[test]
    fn test_legacy_rows_load_and_pass_any_filter() {
        let dir = tempfile::tempdir().unwrap();
        let store = PointStore::new(dir.path());
        write_legacy_file(&store, "bob");

        let unfiltered = store.load_all("bob", None).unwrap();
        assert_eq!(unfiltered.len(), 2);
        assert_eq!(unfiltered[0].sport, "unknown");

        // Legacy rows cannot be excluded by a sport filter and adopt it.
        let filtered = store.load_all("bob", Some("cycling")).unwrap();
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].sport, "cycling");
    }

    #[test]
    fn test_legacy_file_is_compacted_on_append() {
        let dir = tempfile::tempdir().unwrap();
        let store = PointStore::new(dir.path());
        write_legacy_file(&store, "bob");

        assert!(store.has("bob", "7").unwrap());
        store
            .append("bob", &[GeoPoint::new(52.3, 5.3, "8", "cycling")])
            .unwrap();

        let raw = std::fs::read_to_string(store.user_file("bob")).unwrap();
        for line in raw.lines() {
            assert_eq!(line.split(',').count(), 4, "row not compacted: {}", line);
        }
        assert!(raw.contains("unknown"));

        let loaded = store.load_all("bob", None).unwrap();
        assert_eq!(loaded.len(), 3);
    }

    #[test]
    fn test_legacy_activity_still_deduplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = PointStore::new(dir.path());
        write_legacy_file(&store, "bob");

        // Activity 7 exists as legacy rows; appending it again is a no-op.
        assert_eq!(
            store
                .append("bob", &[GeoPoint::new(52.1, 5.1, "7", "cycling")])
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_unwritable_root_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        File::create(&blocker).unwrap();

        // The user partition cannot be created below a regular file.
        let store = PointStore::new(&blocker);
        let err = store.append("alice", &sample_points("100")).unwrap_err();
        assert!(matches!(err, TrackerError::Storage { .. }));
    }

    #[test]
    fn test_malformed_row_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = PointStore::new(dir.path());
        let path = store.user_file("mallory");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "52.0,5.0\n").unwrap();

        let err = store.load_all("mallory", None).unwrap_err();
        assert!(matches!(err, TrackerError::Storage { .. }));
    }
}
