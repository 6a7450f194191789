//! Common test fixtures for crop-weather tests.
//!
//! The test domain is a 2x2 degree square split into a northern and a
//! southern administrative unit, covered by an 8x8 grid of 0.25 degree cells.

use chrono::NaiveDate;

use agro_common::{AdminFeature, BoundingBox, GeoTransform, Polygon};

/// Name used for the test domain schema.
pub const TEST_DOMAIN: &str = "testland";

pub const GRID_WIDTH: usize = 8;
pub const GRID_HEIGHT: usize = 8;

/// Domain extent.
pub const DOMAIN_BBOX: (f64, f64, f64, f64) = (30.0, -2.0, 32.0, 0.0);

/// A point inside the northern unit, in the centre of cell (2, 1).
pub const NORTH_POINT: (f64, f64) = (30.625, -0.375);

/// A point inside the southern unit.
pub const SOUTH_POINT: (f64, f64) = (31.375, -1.625);

/// Placement of the standard test grid (north-up, upper-left origin).
pub fn test_transform() -> GeoTransform {
    GeoTransform::new(DOMAIN_BBOX.0, DOMAIN_BBOX.3, 0.25, -0.25)
}

pub fn domain_bbox() -> BoundingBox {
    let (a, b, c, d) = DOMAIN_BBOX;
    BoundingBox::new(a, b, c, d)
}

/// Boundary features of the test domain: "north" and "south".
pub fn admin_features() -> Vec<AdminFeature> {
    let (min_x, min_y, max_x, max_y) = DOMAIN_BBOX;
    let mid_y = (min_y + max_y) / 2.0;
    vec![
        AdminFeature::new(
            "north",
            Polygon::from_bbox(&BoundingBox::new(min_x, mid_y, max_x, max_y)),
        ),
        AdminFeature::new(
            "south",
            Polygon::from_bbox(&BoundingBox::new(min_x, min_y, max_x, mid_y)),
        ),
    ]
}

/// Shorthand for a calendar date.
pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid fixture date")
}
