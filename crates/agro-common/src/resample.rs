//! Nearest-neighbour resampling between grids.

use crate::grid::{GeoTransform, GridTile};

/// Resample `source` onto a target grid by nearest neighbour.
///
/// Target cells whose centre falls outside the source, or on a source nodata
/// cell, are written as the source nodata value.
pub fn resample_nearest(
    source: &GridTile,
    width: usize,
    height: usize,
    transform: GeoTransform,
) -> GridTile {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        let lat = transform.origin_y + (row as f64 + 0.5) * transform.pixel_height;
        for col in 0..width {
            let lon = transform.origin_x + (col as f64 + 0.5) * transform.pixel_width;
            data.push(source.value_at(lon, lat).unwrap_or(source.nodata));
        }
    }
    GridTile {
        width,
        height,
        transform,
        nodata: source.nodata,
        data,
    }
}

/// Resample `source` onto the grid of `reference`.
pub fn resample_like(source: &GridTile, reference: &GridTile) -> GridTile {
    if source.same_grid(reference) {
        return source.clone();
    }
    resample_nearest(source, reference.width, reference.height, reference.transform)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coarse_to_fine() {
        let coarse = GridTile::new(
            2,
            1,
            GeoTransform::new(0.0, 1.0, 1.0, -1.0),
            -9999.0,
            vec![10.0, 20.0],
        )
        .unwrap();
        let fine = resample_nearest(&coarse, 4, 2, GeoTransform::new(0.0, 1.0, 0.5, -0.5));
        assert_eq!(fine.data, vec![10.0, 10.0, 20.0, 20.0, 10.0, 10.0, 20.0, 20.0]);
    }

    #[test]
    fn test_outside_source_is_nodata() {
        let src = GridTile::filled(1, 1, GeoTransform::new(0.0, 1.0, 1.0, -1.0), 5.0);
        let out = resample_nearest(&src, 2, 1, GeoTransform::new(0.0, 1.0, 1.0, -1.0));
        assert_eq!(out.data, vec![5.0, src.nodata]);
    }
}
