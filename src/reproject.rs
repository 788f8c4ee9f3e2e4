//! Coordinate reprojection to WGS84 (EPSG:4326).
//!
//! The Dutch postcode layer ships in EPSG:28992 (Amersfoort / RD New).
//! This module implements the published approximation polynomials for the
//! RD → WGS84 transformation, accurate to well under a meter across the
//! Netherlands, so the catalog loader needs no external projection library.

/// RD New false origin (Amersfoort), meters.
const X0: f64 = 155_000.0;
const Y0: f64 = 463_000.0;

/// WGS84 coordinates of the RD origin, degrees.
const PHI0: f64 = 52.155_174_40;
const LAM0: f64 = 5.387_206_21;

/// Latitude series coefficients (arc seconds), indexed by (p, q) powers of
/// the scaled easting/northing offsets.
const K: [(i32, i32, f64); 11] = [
    (0, 1, 3235.653_89),
    (2, 0, -32.582_97),
    (0, 2, -0.247_50),
    (2, 1, -0.849_78),
    (0, 3, -0.065_50),
    (2, 2, -0.017_09),
    (1, 0, -0.007_38),
    (4, 0, 0.005_30),
    (2, 3, -0.000_39),
    (4, 1, 0.000_33),
    (1, 1, -0.000_12),
];

/// Longitude series coefficients (arc seconds).
const L: [(i32, i32, f64); 12] = [
    (1, 0, 5260.529_16),
    (1, 1, 105.946_84),
    (1, 2, 2.456_56),
    (3, 0, -0.818_85),
    (1, 3, 0.055_94),
    (3, 1, -0.056_07),
    (0, 1, 0.011_99),
    (3, 2, -0.002_56),
    (1, 4, 0.001_28),
    (0, 2, 0.000_22),
    (2, 0, -0.000_22),
    (5, 0, 0.000_26),
];

/// Convert RD New (EPSG:28992) easting/northing in meters to WGS84
/// (latitude, longitude) in degrees.
pub fn rd_new_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let dx = (x - X0) * 1e-5;
    let dy = (y - Y0) * 1e-5;

    let lat_sec: f64 = K
        .iter()
        .map(|&(p, q, k)| k * dx.powi(p) * dy.powi(q))
        .sum();
    let lon_sec: f64 = L
        .iter()
        .map(|&(p, q, l)| l * dx.powi(p) * dy.powi(q))
        .sum();

    (PHI0 + lat_sec / 3600.0, LAM0 + lon_sec / 3600.0)
}
