//! Postcode polygon catalog.
//!
//! Loads a GeoJSON FeatureCollection of postcode areas, normalizes every
//! geometry to WGS84 degrees, and keeps only the fields the pipeline needs:
//! the postcode code and the boundary. Any defect in the source aborts the
//! load; there is no partial catalog.

use std::collections::HashMap;
use std::path::Path;

use geo::{Coord, LineString, MultiPolygon, Polygon};
use geojson::{Feature, GeoJson, Value};
use log::{debug, info};

use crate::error::{Result, TrackerError};
use crate::reproject::rd_new_to_wgs84;

/// A postcode region with its boundary in WGS84 degrees.
///
/// `crossed` is derived fresh on every analysis run and is never persisted.
#[derive(Debug, Clone)]
pub struct PostcodeArea {
    pub code: String,
    pub boundary: MultiPolygon<f64>,
    pub crossed: bool,
}

impl PostcodeArea {
    pub fn new(code: &str, boundary: MultiPolygon<f64>) -> Self {
        Self {
            code: code.to_string(),
            boundary,
            crossed: false,
        }
    }
}

/// Source coordinate reference systems the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceCrs {
    /// Already WGS84 / CRS84 degrees
    Wgs84,
    /// Amersfoort / RD New (EPSG:28992), the postcode layer's native CRS
    RdNew,
}

/// Load a postcode catalog from a GeoJSON file.
///
/// The file must be a FeatureCollection whose features carry a `postcode`
/// property and Polygon or MultiPolygon geometry. Geometries are
/// reprojected to WGS84 when the collection declares EPSG:28992. Duplicate
/// postcode codes resolve last-wins.
pub fn load_catalog(path: &Path) -> Result<Vec<PostcodeArea>> {
    let text = std::fs::read_to_string(path).map_err(|e| TrackerError::Format {
        message: format!("cannot read {}: {}", path.display(), e),
    })?;
    let geojson: GeoJson = text.parse().map_err(|e: geojson::Error| TrackerError::Format {
        message: e.to_string(),
    })?;
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => {
            return Err(TrackerError::Format {
                message: "postcode source is not a FeatureCollection".to_string(),
            })
        }
    };

    let crs = source_crs(collection.foreign_members.as_ref())?;

    let mut areas: Vec<PostcodeArea> = Vec::with_capacity(collection.features.len());
    let mut by_code: HashMap<String, usize> = HashMap::new();
    for feature in &collection.features {
        let code = postcode_of(feature)?;
        let boundary = boundary_of(feature, crs)?;
        let area = PostcodeArea::new(&code, boundary);
        match by_code.get(&code) {
            // Duplicate source rows: the last one wins, deterministically.
            Some(&idx) => {
                debug!("Duplicate postcode {} in source; keeping last", code);
                areas[idx] = area;
            }
            None => {
                by_code.insert(code, areas.len());
                areas.push(area);
            }
        }
    }

    info!(
        "Loaded {} postcode areas from {}",
        areas.len(),
        path.display()
    );
    Ok(areas)
}

/// Read the legacy `crs` member of the collection, defaulting to WGS84
/// when absent (the GeoJSON spec's own default).
fn source_crs(foreign: Option<&geojson::JsonObject>) -> Result<SourceCrs> {
    let Some(name) = foreign
        .and_then(|m| m.get("crs"))
        .and_then(|crs| crs.get("properties"))
        .and_then(|props| props.get("name"))
        .and_then(|name| name.as_str())
    else {
        return Ok(SourceCrs::Wgs84);
    };

    if name.contains("CRS84") || name.contains("4326") {
        Ok(SourceCrs::Wgs84)
    } else if name.contains("28992") {
        Ok(SourceCrs::RdNew)
    } else {
        Err(TrackerError::Format {
            message: format!("unsupported source CRS '{}'", name),
        })
    }
}

fn postcode_of(feature: &Feature) -> Result<String> {
    let value = feature
        .properties
        .as_ref()
        .and_then(|props| props.get("postcode"))
        .ok_or_else(|| TrackerError::Format {
            message: "feature without a postcode property".to_string(),
        })?;
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Ok(s.clone()),
        // Some exports write numeric PC4 codes.
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(TrackerError::Format {
            message: format!("unusable postcode value: {}", other),
        }),
    }
}

fn boundary_of(feature: &Feature, crs: SourceCrs) -> Result<MultiPolygon<f64>> {
    let geometry = feature.geometry.as_ref().ok_or_else(|| TrackerError::Format {
        message: "feature without geometry".to_string(),
    })?;
    match &geometry.value {
        Value::Polygon(rings) => Ok(MultiPolygon(vec![rings_to_polygon(rings, crs)?])),
        Value::MultiPolygon(polygons) => {
            let mut parts = Vec::with_capacity(polygons.len());
            for rings in polygons {
                parts.push(rings_to_polygon(rings, crs)?);
            }
            Ok(MultiPolygon(parts))
        }
        other => Err(TrackerError::Format {
            message: format!("unsupported geometry type: {}", other.type_name()),
        }),
    }
}

fn rings_to_polygon(rings: &[Vec<Vec<f64>>], crs: SourceCrs) -> Result<Polygon<f64>> {
    let mut converted = rings.iter().map(|ring| ring_to_line_string(ring, crs));
    let exterior = converted.next().ok_or_else(|| TrackerError::Format {
        message: "polygon without an exterior ring".to_string(),
    })??;
    let interiors = converted.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn ring_to_line_string(ring: &[Vec<f64>], crs: SourceCrs) -> Result<LineString<f64>> {
    let mut coords = Vec::with_capacity(ring.len());
    for position in ring {
        let (x, y) = match position.as_slice() {
            [x, y, ..] => (*x, *y),
            _ => {
                return Err(TrackerError::Format {
                    message: "ring position with fewer than 2 ordinates".to_string(),
                })
            }
        };
        let (lon, lat) = match crs {
            SourceCrs::Wgs84 => (x, y),
            SourceCrs::RdNew => {
                let (lat, lon) = rd_new_to_wgs84(x, y);
                (lon, lat)
            }
        };
        coords.push(Coord { x: lon, y: lat });
    }
    Ok(LineString::new(coords))
}
