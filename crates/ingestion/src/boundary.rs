//! Administrative boundary loading from GeoJSON feature collections.

use std::path::Path;

use agro_common::{AdminFeature, MultiPolygon, Polygon};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{IngestionError, Result};

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Map<String, Value>,
    geometry: Option<Geometry>,
}

/// Positions may carry a third (elevation) ordinate, which is dropped.
type Ring = Vec<Vec<f64>>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
enum Geometry {
    Polygon(Vec<Ring>),
    MultiPolygon(Vec<Vec<Ring>>),
}

fn to_polygon(rings: Vec<Ring>) -> Result<Polygon> {
    let mut rings = rings.into_iter().map(|ring| {
        ring.into_iter()
            .map(|p| match p.as_slice() {
                [x, y, ..] => Ok([*x, *y]),
                _ => Err(IngestionError::boundary("position with fewer than two ordinates")),
            })
            .collect::<Result<Vec<[f64; 2]>>>()
    });
    let exterior = rings
        .next()
        .ok_or_else(|| IngestionError::boundary("polygon without rings"))??;
    Ok(Polygon {
        exterior,
        holes: rings.collect::<Result<_>>()?,
    })
}

/// Parse a feature collection, naming each unit by `admin1_field`.
///
/// Features without geometry are rejected. Numeric names are rendered as text.
pub fn parse_boundary(json: &str, admin1_field: &str) -> Result<Vec<AdminFeature>> {
    let collection: FeatureCollection =
        serde_json::from_str(json).map_err(|e| IngestionError::boundary(e.to_string()))?;

    let mut features = Vec::with_capacity(collection.features.len());
    for (i, feature) in collection.features.into_iter().enumerate() {
        let admin1 = match feature.properties.get(admin1_field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(IngestionError::boundary(format!(
                    "feature {} has no '{}' property",
                    i, admin1_field
                )))
            }
        };
        let geometry = match feature.geometry {
            Some(Geometry::Polygon(rings)) => MultiPolygon::from(to_polygon(rings)?),
            Some(Geometry::MultiPolygon(parts)) => MultiPolygon {
                polygons: parts.into_iter().map(to_polygon).collect::<Result<_>>()?,
            },
            None => {
                return Err(IngestionError::boundary(format!(
                    "feature '{}' has no geometry",
                    admin1
                )))
            }
        };
        features.push(AdminFeature::new(admin1, geometry));
    }

    if features.is_empty() {
        return Err(IngestionError::boundary("feature collection is empty"));
    }
    Ok(features)
}

/// Read and parse a boundary file.
pub async fn load_boundary(path: &Path, admin1_field: &str) -> Result<Vec<AdminFeature>> {
    let json = tokio::fs::read_to_string(path).await?;
    parse_boundary(&json, admin1_field)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLLECTION: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"NAME_1": "north", "pop": 3},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[30, -1], [32, -1], [32, 0], [30, 0], [30, -1]]]
                }
            },
            {
                "type": "Feature",
                "properties": {"NAME_1": "south"},
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [
                        [[[30, -2, 5], [31, -2, 5], [31, -1, 5], [30, -1, 5], [30, -2, 5]]],
                        [[[31, -2], [32, -2], [32, -1], [31, -1], [31, -2]]]
                    ]
                }
            }
        ]
    }"#;

    #[test]
    fn test_parse_polygon_and_multipolygon() {
        let features = parse_boundary(COLLECTION, "NAME_1").unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].admin1, "north");
        assert!(features[0].geometry.contains(31.0, -0.5));
        assert_eq!(features[1].geometry.polygons.len(), 2);
        assert!(features[1].geometry.contains(31.5, -1.5));
        assert!(!features[1].geometry.contains(31.0, -0.5));
    }

    #[test]
    fn test_missing_name_property() {
        let err = parse_boundary(COLLECTION, "admin1").unwrap_err();
        assert!(matches!(err, IngestionError::Boundary(ref m) if m.contains("admin1")));
    }

    #[test]
    fn test_empty_collection() {
        let err = parse_boundary(r#"{"type":"FeatureCollection","features":[]}"#, "x").unwrap_err();
        assert!(matches!(err, IngestionError::Boundary(_)));
    }
}
