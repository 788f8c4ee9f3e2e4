//! Batch pipeline: trace ingestion and analysis runs.
//!
//! Ingestion walks a directory of downloaded trace files, skips activities
//! the store already holds, decodes the rest, and appends. Decode failures
//! are isolated per file; a store failure aborts the batch. Analysis
//! recomputes the crossing set and statistics from the full accumulated
//! store on every run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{error, info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use serde::{Deserialize, Serialize};

use crate::catalog::{load_catalog, PostcodeArea};
use crate::coverage::{crossing_stats, mark_crossed, CoverageSummary};
use crate::decode::{activity_id_from_path, decode_trace};
use crate::error::{Result, TrackerError};
use crate::intersect::crossed_codes;
use crate::store::PointStore;

/// Outcome counters for one ingestion batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Trace files found in the directory
    pub files_seen: usize,
    /// Files decoded and merged into the store
    pub files_decoded: usize,
    /// Files skipped because their activity was already stored
    pub files_skipped: usize,
    /// Files that failed to decode (logged, batch continued)
    pub files_failed: usize,
    /// Total point rows written
    pub points_written: usize,
}

/// Result of one analysis run: the marked catalog plus its summary.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub areas: Vec<PostcodeArea>,
    pub summary: CoverageSummary,
}

/// Ingest every `.fit` file in a directory into a user's point store.
///
/// Activities already present in the store are skipped without decoding.
/// A malformed trace is logged and counted, and the batch continues; the
/// first store failure aborts. `progress` observes `(done, total)` after
/// each file and has no influence on control flow.
pub fn ingest_directory(
    store: &PointStore,
    user: &str,
    sport: &str,
    dir: &Path,
    mut progress: impl FnMut(usize, usize),
) -> Result<BatchReport> {
    let paths = trace_files(dir)?;
    let total = paths.len();
    let mut report = BatchReport {
        files_seen: total,
        ..BatchReport::default()
    };

    for (done, path) in paths.iter().enumerate() {
        ingest_one(store, user, sport, path, &mut report)?;
        progress(done + 1, total);
    }

    info!(
        "Ingested {} of {} trace files for user {} ({} skipped, {} failed, {} points)",
        report.files_decoded,
        report.files_seen,
        user,
        report.files_skipped,
        report.files_failed,
        report.points_written
    );
    Ok(report)
}

/// Parallel variant of [`ingest_directory`]: decoding fans out across
/// worker threads (each file is a pure read), appends stay sequential so
/// the report and store writes keep batch semantics.
#[cfg(feature = "parallel")]
pub fn ingest_directory_parallel(
    store: &PointStore,
    user: &str,
    sport: &str,
    dir: &Path,
    mut progress: impl FnMut(usize, usize),
) -> Result<BatchReport> {
    let paths = trace_files(dir)?;
    let total = paths.len();
    let mut report = BatchReport {
        files_seen: total,
        ..BatchReport::default()
    };

    // Dedup check up front so already-stored activities never hit a decoder.
    let mut to_decode = Vec::new();
    for path in &paths {
        let Some(activity_id) = activity_id_from_path(path) else {
            warn!("Cannot derive an activity id from {}; skipping", path.display());
            report.files_skipped += 1;
            continue;
        };
        if store.has(user, &activity_id)? {
            info!("Activity {} already stored; skipping", activity_id);
            report.files_skipped += 1;
        } else {
            to_decode.push((path.clone(), activity_id));
        }
    }
    progress(report.files_skipped, total);

    let decoded: Vec<_> = to_decode
        .par_iter()
        .map(|(path, activity_id)| (activity_id, decode_trace(path, activity_id, sport)))
        .collect();

    let mut done = report.files_skipped;
    for (activity_id, outcome) in decoded {
        match outcome {
            Ok(points) => {
                report.points_written += store.append(user, &points)?;
                report.files_decoded += 1;
            }
            Err(err @ TrackerError::Decode { .. }) => {
                warn!("Skipping activity {}: {}", activity_id, err);
                report.files_failed += 1;
            }
            Err(other) => return Err(other),
        }
        done += 1;
        progress(done, total);
    }

    info!(
        "Ingested {} of {} trace files for user {} ({} skipped, {} failed, {} points)",
        report.files_decoded,
        report.files_seen,
        user,
        report.files_skipped,
        report.files_failed,
        report.points_written
    );
    Ok(report)
}

fn ingest_one(
    store: &PointStore,
    user: &str,
    sport: &str,
    path: &Path,
    report: &mut BatchReport,
) -> Result<()> {
    let Some(activity_id) = activity_id_from_path(path) else {
        warn!("Cannot derive an activity id from {}; skipping", path.display());
        report.files_skipped += 1;
        return Ok(());
    };

    if store.has(user, &activity_id)? {
        info!("Activity {} already stored; skipping", activity_id);
        report.files_skipped += 1;
        return Ok(());
    }

    match decode_trace(path, &activity_id, sport) {
        Ok(points) => {
            if points.is_empty() {
                info!("Activity {} carries no position fixes", activity_id);
            }
            report.points_written += store.append(user, &points)?;
            report.files_decoded += 1;
            Ok(())
        }
        Err(err @ TrackerError::Decode { .. }) => {
            warn!("Skipping activity {}: {}", activity_id, err);
            report.files_failed += 1;
            Ok(())
        }
        Err(other) => {
            error!("Aborting batch: {}", other);
            Err(other)
        }
    }
}

/// List trace files in deterministic order.
fn trace_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| TrackerError::Storage {
        message: format!("cannot read trace directory {}: {}", dir.display(), e),
    })?;

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| TrackerError::Storage {
            message: e.to_string(),
        })?;
        let path = entry.path();
        let is_fit = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("fit"));
        if is_fit && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Run a full analysis for a user: load the accumulated store, the
/// postcode catalog, intersect, and aggregate.
///
/// Every run recomputes the crossing set from scratch; nothing derived is
/// carried over between runs. An empty store is a valid input and yields
/// zero crossed areas.
pub fn analyze(
    store: &PointStore,
    user: &str,
    sport_filter: Option<&str>,
    catalog_path: &Path,
) -> Result<Analysis> {
    let points = store.load_all(user, sport_filter)?;
    info!("Analyzing {} stored points for user {}", points.len(), user);

    let mut areas = load_catalog(catalog_path)?;
    let crossed: HashSet<String> = crossed_codes(&points, &areas);
    mark_crossed(&mut areas, &crossed);
    let summary = crossing_stats(&areas);

    info!(
        "User {} crossed {} of {} postcode areas ({:.1}%)",
        user,
        summary.crossed,
        summary.crossed + summary.uncrossed,
        summary.percent
    );
    Ok(Analysis { areas, summary })
}
