//! Administrative boundary polygons and their WKT form.

use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};
use crate::BoundingBox;

/// Polygon with an exterior ring and optional holes, lon/lat pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<[f64; 2]>,
    #[serde(default)]
    pub holes: Vec<Vec<[f64; 2]>>,
}

impl Polygon {
    pub fn new(exterior: Vec<[f64; 2]>) -> Self {
        Self {
            exterior,
            holes: Vec::new(),
        }
    }

    /// Rectangle covering a bounding box.
    pub fn from_bbox(bbox: &BoundingBox) -> Self {
        Self::new(bbox.ring().into_iter().map(|(x, y)| [x, y]).collect())
    }

    /// Even-odd containment test; inside the exterior and outside every hole.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        ring_contains(&self.exterior, x, y) && !self.holes.iter().any(|h| ring_contains(h, x, y))
    }
}

fn ring_contains(ring: &[[f64; 2]], x: f64, y: f64) -> bool {
    let mut inside = false;
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let [xi, yi] = ring[i];
        let [xj, yj] = ring[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// One or more polygons forming an administrative unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiPolygon {
    pub polygons: Vec<Polygon>,
}

impl MultiPolygon {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.polygons.iter().any(|p| p.contains(x, y))
    }

    /// Envelope of all exterior rings.
    pub fn envelope(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(
            self.polygons
                .iter()
                .flat_map(|p| p.exterior.iter().map(|[x, y]| (*x, *y))),
        )
    }

    pub fn to_wkt(&self) -> String {
        let polys: Vec<String> = self
            .polygons
            .iter()
            .map(|p| {
                let rings: Vec<String> = std::iter::once(&p.exterior)
                    .chain(p.holes.iter())
                    .map(|r| {
                        let coords: Vec<String> =
                            r.iter().map(|[x, y]| format!("{} {}", x, y)).collect();
                        format!("({})", coords.join(","))
                    })
                    .collect();
                format!("({})", rings.join(","))
            })
            .collect();
        format!("MULTIPOLYGON({})", polys.join(","))
    }

    /// Parse `POLYGON` or `MULTIPOLYGON` WKT.
    pub fn from_wkt(wkt: &str) -> GridResult<Self> {
        let trimmed = wkt.trim();
        let upper = trimmed.to_ascii_uppercase();
        let (multi, body) = if let Some(rest) = upper.strip_prefix("MULTIPOLYGON") {
            (true, &trimmed[trimmed.len() - rest.len()..])
        } else if let Some(rest) = upper.strip_prefix("POLYGON") {
            (false, &trimmed[trimmed.len() - rest.len()..])
        } else {
            return Err(GridError::InvalidWkt(wkt.to_string()));
        };

        let bytes = body.trim().as_bytes();
        let mut pos = 0;
        let node = parse_group(bytes, &mut pos).ok_or_else(|| GridError::InvalidWkt(wkt.to_string()))?;
        let polygons = if multi {
            match node {
                Node::List(items) => items
                    .into_iter()
                    .map(polygon_from_node)
                    .collect::<Option<Vec<_>>>(),
                Node::Coords(_) => None,
            }
        } else {
            polygon_from_node(node).map(|p| vec![p])
        };
        polygons
            .filter(|p| !p.is_empty())
            .map(|polygons| MultiPolygon { polygons })
            .ok_or_else(|| GridError::InvalidWkt(wkt.to_string()))
    }
}

impl From<Polygon> for MultiPolygon {
    fn from(p: Polygon) -> Self {
        MultiPolygon { polygons: vec![p] }
    }
}

enum Node {
    List(Vec<Node>),
    Coords(Vec<[f64; 2]>),
}

fn skip_ws(b: &[u8], pos: &mut usize) {
    while *pos < b.len() && b[*pos].is_ascii_whitespace() {
        *pos += 1;
    }
}

fn parse_group(b: &[u8], pos: &mut usize) -> Option<Node> {
    skip_ws(b, pos);
    if b.get(*pos) != Some(&b'(') {
        return None;
    }
    *pos += 1;
    skip_ws(b, pos);
    if b.get(*pos) == Some(&b'(') {
        let mut items = Vec::new();
        loop {
            items.push(parse_group(b, pos)?);
            skip_ws(b, pos);
            match b.get(*pos)? {
                b',' => *pos += 1,
                b')' => {
                    *pos += 1;
                    return Some(Node::List(items));
                }
                _ => return None,
            }
        }
    }
    let start = *pos;
    while *pos < b.len() && b[*pos] != b')' {
        *pos += 1;
    }
    let text = std::str::from_utf8(b.get(start..*pos)?).ok()?;
    *pos += 1;
    let coords = text
        .split(',')
        .map(|pair| {
            let mut it = pair.split_whitespace().map(|v| v.parse::<f64>());
            match (it.next(), it.next()) {
                (Some(Ok(x)), Some(Ok(y))) => Some([x, y]),
                _ => None,
            }
        })
        .collect::<Option<Vec<_>>>()?;
    Some(Node::Coords(coords))
}

fn polygon_from_node(node: Node) -> Option<Polygon> {
    let Node::List(rings) = node else {
        return None;
    };
    let mut rings = rings.into_iter().map(|r| match r {
        Node::Coords(c) => Some(c),
        Node::List(_) => None,
    });
    let exterior = rings.next()??;
    let holes = rings.collect::<Option<Vec<_>>>()?;
    Some(Polygon { exterior, holes })
}

/// A boundary feature labelled with its first-level administrative unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminFeature {
    pub admin1: String,
    pub geometry: MultiPolygon,
}

impl AdminFeature {
    pub fn new(admin1: impl Into<String>, geometry: impl Into<MultiPolygon>) -> Self {
        Self {
            admin1: admin1.into(),
            geometry: geometry.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Polygon {
        Polygon::from_bbox(&BoundingBox::new(0.0, 0.0, 2.0, 2.0))
    }

    #[test]
    fn test_contains_with_hole() {
        let mut p = square();
        p.holes.push(vec![[0.5, 0.5], [1.0, 0.5], [1.0, 1.0], [0.5, 1.0], [0.5, 0.5]]);
        assert!(p.contains(1.5, 1.5));
        assert!(!p.contains(0.75, 0.75));
        assert!(!p.contains(3.0, 1.0));
    }

    #[test]
    fn test_wkt_round_trip() {
        let mp = MultiPolygon::from(square());
        let wkt = mp.to_wkt();
        assert!(wkt.starts_with("MULTIPOLYGON(((0 0,2 0"));
        assert_eq!(MultiPolygon::from_wkt(&wkt).unwrap(), mp);
    }

    #[test]
    fn test_parse_plain_polygon() {
        let mp = MultiPolygon::from_wkt("POLYGON ((30 10, 40 40, 20 40, 10 20, 30 10))").unwrap();
        assert_eq!(mp.polygons.len(), 1);
        assert_eq!(mp.polygons[0].exterior[1], [40.0, 40.0]);
        assert_eq!(mp.envelope(), Some(BoundingBox::new(10.0, 10.0, 40.0, 40.0)));
    }

    #[test]
    fn test_invalid_wkt() {
        assert!(MultiPolygon::from_wkt("POINT (1 2)").is_err());
        assert!(MultiPolygon::from_wkt("POLYGON ((1 2, 3))").is_err());
    }
}
