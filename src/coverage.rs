//! Coverage aggregation: crossed flags, summary statistics, and the
//! render-ready GeoJSON export.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::catalog::PostcodeArea;

/// Completion statistics over a postcode catalog.
///
/// `crossed + uncrossed` always equals the catalog size; `percent` is kept
/// at full double precision (the presentation layer rounds for display).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub crossed: usize,
    pub uncrossed: usize,
    pub percent: f64,
}

/// Set each area's `crossed` flag from the intersection result.
///
/// Flags are recomputed fresh on every run: areas absent from the crossed
/// set are reset, never left at a stale value from a previous analysis.
pub fn mark_crossed(areas: &mut [PostcodeArea], crossed: &HashSet<String>) {
    for area in areas {
        area.crossed = crossed.contains(&area.code);
    }
}

/// Compute completion statistics. An empty catalog yields `{0, 0, 0.0}`.
pub fn crossing_stats(areas: &[PostcodeArea]) -> CoverageSummary {
    let crossed = areas.iter().filter(|a| a.crossed).count();
    let uncrossed = areas.len() - crossed;
    let percent = if areas.is_empty() {
        0.0
    } else {
        crossed as f64 / areas.len() as f64 * 100.0
    };
    CoverageSummary {
        crossed,
        uncrossed,
        percent,
    }
}

/// Export marked areas and their summary as a GeoJSON FeatureCollection
/// for the map-rendering collaborator: crossed areas fill green, the rest
/// red, with the summary attached under a `stats` member.
pub fn to_feature_collection(
    areas: &[PostcodeArea],
    summary: &CoverageSummary,
) -> serde_json::Value {
    let features: Vec<serde_json::Value> = areas
        .iter()
        .map(|area| {
            let fill = if area.crossed { "green" } else { "red" };
            json!({
                "type": "Feature",
                "geometry": boundary_to_geometry(area),
                "properties": {
                    "postcode": area.code,
                    "crossed": area.crossed,
                    "style": {
                        "fillColor": fill,
                        "color": "black",
                        "weight": 0.7,
                        "fillOpacity": 0.2,
                    }
                }
            })
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "features": features,
        "stats": {
            "crossed": summary.crossed,
            "uncrossed": summary.uncrossed,
            "percent": summary.percent,
        }
    })
}

fn boundary_to_geometry(area: &PostcodeArea) -> serde_json::Value {
    let coordinates: Vec<Vec<Vec<[f64; 2]>>> = area
        .boundary
        .0
        .iter()
        .map(|polygon| {
            let mut rings: Vec<Vec<[f64; 2]>> = Vec::with_capacity(1 + polygon.interiors().len());
            rings.push(ring_coords(polygon.exterior()));
            rings.extend(polygon.interiors().iter().map(ring_coords));
            rings
        })
        .collect();
    json!({ "type": "MultiPolygon", "coordinates": coordinates })
}

fn ring_coords(ring: &geo::LineString<f64>) -> Vec<[f64; 2]> {
    ring.coords().map(|c| [c.x, c.y]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    fn area(code: &str, x0: f64, y0: f64) -> PostcodeArea {
        let boundary = polygon![
            (x: x0, y: y0),
            (x: x0 + 0.1, y: y0),
            (x: x0 + 0.1, y: y0 + 0.1),
            (x: x0, y: y0 + 0.1),
            (x: x0, y: y0),
        ];
        PostcodeArea::new(code, MultiPolygon(vec![boundary]))
    }

    #[test]
    fn test_mark_and_stats() {
        let mut areas = vec![area("1011", 4.9, 51.9), area("1012", 5.1, 51.9), area("1013", 5.3, 51.9)];
        let crossed = HashSet::from(["1011".to_string()]);

        mark_crossed(&mut areas, &crossed);
        assert!(areas[0].crossed);
        assert!(!areas[1].crossed);

        let summary = crossing_stats(&areas);
        assert_eq!(summary.crossed, 1);
        assert_eq!(summary.uncrossed, 2);
        assert!((summary.percent - 100.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_stats_consistency() {
        for crossed_count in 0..=4_usize {
            let mut areas: Vec<PostcodeArea> = (0..4)
                .map(|i| area(&format!("10{}", i), 4.0 + i as f64, 51.0))
                .collect();
            let crossed: HashSet<String> =
                (0..crossed_count).map(|i| format!("10{}", i)).collect();
            mark_crossed(&mut areas, &crossed);

            let summary = crossing_stats(&areas);
            assert_eq!(summary.crossed + summary.uncrossed, areas.len());
            assert_eq!(summary.crossed, crossed_count);
        }
    }

    #[test]
    fn test_empty_catalog_stats() {
        let summary = crossing_stats(&[]);
        assert_eq!(
            summary,
            CoverageSummary {
                crossed: 0,
                uncrossed: 0,
                percent: 0.0
            }
        );
    }

    #[test]
    fn test_marks_are_recomputed_not_accumulated() {
        let mut areas = vec![area("1011", 4.9, 51.9)];
        mark_crossed(&mut areas, &HashSet::from(["1011".to_string()]));
        assert!(areas[0].crossed);

        // A later run with no hits must clear the flag.
        mark_crossed(&mut areas, &HashSet::new());
        assert!(!areas[0].crossed);
    }

    #[test]
    fn test_feature_collection_shape() {
        let mut areas = vec![area("1011", 4.9, 51.9), area("1012", 5.1, 51.9)];
        mark_crossed(&mut areas, &HashSet::from(["1011".to_string()]));
        let summary = crossing_stats(&areas);

        let fc = to_feature_collection(&areas, &summary);
        assert_eq!(fc["type"], "FeatureCollection");
        assert_eq!(fc["features"].as_array().unwrap().len(), 2);
        assert_eq!(fc["features"][0]["properties"]["postcode"], "1011");
        assert_eq!(fc["features"][0]["properties"]["crossed"], true);
        assert_eq!(
            fc["features"][0]["properties"]["style"]["fillColor"],
            "green"
        );
        assert_eq!(fc["features"][1]["properties"]["style"]["fillColor"], "red");
        assert_eq!(fc["stats"]["crossed"], 1);
        assert_eq!(fc["stats"]["uncrossed"], 1);
        assert_eq!(
            fc["features"][0]["geometry"]["type"],
            "MultiPolygon"
        );
    }
}
