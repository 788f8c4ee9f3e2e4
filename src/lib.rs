//! # Postcode Tracker
//!
//! Postcode-coverage tracking from GPS activity traces.
//!
//! This library provides:
//! - FIT trace decoding (semicircle fixed-point positions → degrees)
//! - A per-user, deduplicated, append-only point store
//! - R-tree accelerated intersection of points against postcode polygons
//! - Idempotent coverage statistics and a render-ready GeoJSON export
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel decoding and intersection with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use geo::{polygon, MultiPolygon};
//! use postcode_tracker::{crossed_codes, crossing_stats, mark_crossed, GeoPoint, PostcodeArea};
//!
//! let points = vec![GeoPoint::new(52.37, 4.89, "morning-ride", "cycling")];
//!
//! let boundary = polygon![
//!     (x: 4.8, y: 52.3),
//!     (x: 5.0, y: 52.3),
//!     (x: 5.0, y: 52.4),
//!     (x: 4.8, y: 52.4),
//!     (x: 4.8, y: 52.3),
//! ];
//! let mut areas = vec![PostcodeArea::new("1011", MultiPolygon(vec![boundary]))];
//!
//! let crossed = crossed_codes(&points, &areas);
//! mark_crossed(&mut areas, &crossed);
//! let summary = crossing_stats(&areas);
//! assert_eq!(summary.crossed, 1);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{Result, TrackerError};

// FIT trace decoding
pub mod decode;
pub use decode::{activity_id_from_path, decode_trace, semicircles_to_degrees};

// Per-user deduplicated point store
pub mod store;
pub use store::PointStore;

// Coordinate reprojection to WGS84
pub mod reproject;

// Postcode polygon catalog
pub mod catalog;
pub use catalog::{load_catalog, PostcodeArea};

// Point-against-polygon intersection
pub mod intersect;
pub use intersect::crossed_codes;
#[cfg(feature = "parallel")]
pub use intersect::crossed_codes_parallel;

// Coverage aggregation and export
pub mod coverage;
pub use coverage::{crossing_stats, mark_crossed, to_feature_collection, CoverageSummary};

// Batch ingestion and analysis runs
pub mod pipeline;
#[cfg(feature = "parallel")]
pub use pipeline::ingest_directory_parallel;
pub use pipeline::{analyze, ingest_directory, Analysis, BatchReport};

// ============================================================================
// Core Types
// ============================================================================

/// A decoded GPS point tagged with the activity it came from.
///
/// # Example
/// ```
/// use postcode_tracker::GeoPoint;
/// let point = GeoPoint::new(52.3731, 4.8925, "12345678", "cycling"); // Amsterdam
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub activity_id: String,
    pub sport: String,
}

impl GeoPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64, activity_id: &str, sport: &str) -> Self {
        Self {
            latitude,
            longitude,
            activity_id: activity_id.to_string(),
            sport: sport.to_string(),
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

// ============================================================================
// Tests
// ============================================================================
