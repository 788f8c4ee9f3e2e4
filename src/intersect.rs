//! Spatial intersection of GPS points against postcode polygons.
//!
//! Candidate lookup goes through an R-tree bulk-loaded with polygon
//! bounding boxes; candidates are confirmed with an exact
//! point-in-or-on-boundary test, so a trace touching a postcode border
//! counts as a crossing. Sub-quadratic in |points| × |polygons|.

use std::collections::HashSet;

use geo::{BoundingRect, Intersects, Point};
use rstar::{RTree, RTreeObject, AABB};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::catalog::PostcodeArea;
use crate::GeoPoint;

/// Bounding box of one postcode area (used for spatial indexing).
#[derive(Debug, Clone)]
struct AreaEnvelope {
    idx: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for AreaEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Build the R-tree over polygon bounding boxes, in (lon, lat) order.
fn build_index(areas: &[PostcodeArea]) -> RTree<AreaEnvelope> {
    let envelopes: Vec<AreaEnvelope> = areas
        .iter()
        .enumerate()
        .filter_map(|(idx, area)| {
            let rect = area.boundary.bounding_rect()?;
            Some(AreaEnvelope {
                idx,
                aabb: AABB::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
            })
        })
        .collect();
    RTree::bulk_load(envelopes)
}

/// Area indices touched by at least one of the given points.
fn crossed_indices(
    points: &[GeoPoint],
    areas: &[PostcodeArea],
    tree: &RTree<AreaEnvelope>,
) -> HashSet<usize> {
    let mut crossed = HashSet::new();
    for point in points {
        if !point.is_valid() {
            continue;
        }
        let location = Point::new(point.longitude, point.latitude);
        let query = AABB::from_point([point.longitude, point.latitude]);
        for candidate in tree.locate_in_envelope_intersecting(&query) {
            // Exact testing is the expensive half; confirmed areas are
            // skipped for every later point.
            if crossed.contains(&candidate.idx) {
                continue;
            }
            if areas[candidate.idx].boundary.intersects(&location) {
                crossed.insert(candidate.idx);
            }
        }
    }
    crossed
}

fn codes_of(areas: &[PostcodeArea], indices: &HashSet<usize>) -> HashSet<String> {
    indices.iter().map(|&idx| areas[idx].code.clone()).collect()
}

/// Compute the set of postcode codes crossed by at least one point.
///
/// The result is a set: order-independent and deterministic for identical
/// inputs. Zero points or zero polygons yield an empty set, not an error.
pub fn crossed_codes(points: &[GeoPoint], areas: &[PostcodeArea]) -> HashSet<String> {
    if points.is_empty() || areas.is_empty() {
        return HashSet::new();
    }
    let tree = build_index(areas);
    let crossed = crossed_indices(points, areas, &tree);
    codes_of(areas, &crossed)
}

/// Parallel variant of [`crossed_codes`]; same result, point chunks are
/// tested concurrently against a shared index.
#[cfg(feature = "parallel")]
pub fn crossed_codes_parallel(points: &[GeoPoint], areas: &[PostcodeArea]) -> HashSet<String> {
    const CHUNK: usize = 2048;

    if points.is_empty() || areas.is_empty() {
        return HashSet::new();
    }
    let tree = build_index(areas);
    let crossed = points
        .par_chunks(CHUNK)
        .map(|chunk| crossed_indices(chunk, areas, &tree))
        .reduce(HashSet::new, |mut acc, found| {
            acc.extend(found);
            acc
        });
    codes_of(areas, &crossed)
}
