//! Grid tiles: a 2D float array tied to a geotransform and a nodata sentinel.

use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};
use crate::statistic::Statistic;
use crate::BoundingBox;

/// Default nodata sentinel for tiles produced in-process.
pub const DEFAULT_NODATA: f64 = -9999.0;

const ALIGN_TOLERANCE: f64 = 1e-9;

/// Affine placement of a north-up grid.
///
/// `origin_x`/`origin_y` is the outer corner of the first cell (upper-left for
/// north-up grids, where `pixel_height` is negative). Skew is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Transform shifted by a whole number of cells.
    pub fn offset(&self, col: usize, row: usize) -> GeoTransform {
        GeoTransform {
            origin_x: self.origin_x + col as f64 * self.pixel_width,
            origin_y: self.origin_y + row as f64 * self.pixel_height,
            ..*self
        }
    }

    fn approx_eq(&self, other: &GeoTransform) -> bool {
        (self.origin_x - other.origin_x).abs() < ALIGN_TOLERANCE
            && (self.origin_y - other.origin_y).abs() < ALIGN_TOLERANCE
            && (self.pixel_width - other.pixel_width).abs() < ALIGN_TOLERANCE
            && (self.pixel_height - other.pixel_height).abs() < ALIGN_TOLERANCE
    }
}

/// One gridded slice: row-major values, placement and nodata sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridTile {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    #[serde(default = "default_nodata")]
    pub nodata: f64,
    pub data: Vec<f64>,
}

fn default_nodata() -> f64 {
    DEFAULT_NODATA
}

impl GridTile {
    /// Create a tile, checking that `data` has `width * height` values.
    pub fn new(
        width: usize,
        height: usize,
        transform: GeoTransform,
        nodata: f64,
        data: Vec<f64>,
    ) -> GridResult<Self> {
        if width == 0 || height == 0 {
            return Err(GridError::Empty);
        }
        if data.len() != width * height {
            return Err(GridError::ShapeMismatch {
                width,
                height,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            transform,
            nodata,
            data,
        })
    }

    /// Tile where every cell holds `value`.
    pub fn filled(width: usize, height: usize, transform: GeoTransform, value: f64) -> Self {
        Self {
            width,
            height,
            transform,
            nodata: DEFAULT_NODATA,
            data: vec![value; width * height],
        }
    }

    /// True when `v` should be treated as missing.
    pub fn is_nodata(&self, v: f64) -> bool {
        v.is_nan() || v == self.nodata
    }

    /// Value at a cell, `None` for nodata or out-of-range indices.
    pub fn get(&self, col: usize, row: usize) -> Option<f64> {
        if col >= self.width || row >= self.height {
            return None;
        }
        let v = self.data[row * self.width + col];
        if self.is_nodata(v) {
            None
        } else {
            Some(v)
        }
    }

    /// Cell containing a coordinate.
    pub fn pixel_of(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        let t = &self.transform;
        let col = ((lon - t.origin_x) / t.pixel_width).floor();
        let row = ((lat - t.origin_y) / t.pixel_height).floor();
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col as usize, row as usize);
        if col >= self.width || row >= self.height {
            return None;
        }
        Some((col, row))
    }

    /// Sample the tile at a coordinate.
    pub fn value_at(&self, lon: f64, lat: f64) -> Option<f64> {
        let (col, row) = self.pixel_of(lon, lat)?;
        self.get(col, row)
    }

    /// Centre coordinate of a cell.
    pub fn cell_center(&self, col: usize, row: usize) -> (f64, f64) {
        let t = &self.transform;
        (
            t.origin_x + (col as f64 + 0.5) * t.pixel_width,
            t.origin_y + (row as f64 + 0.5) * t.pixel_height,
        )
    }

    /// Envelope of the tile.
    pub fn bbox(&self) -> BoundingBox {
        let t = &self.transform;
        let x1 = t.origin_x + self.width as f64 * t.pixel_width;
        let y1 = t.origin_y + self.height as f64 * t.pixel_height;
        BoundingBox::new(
            t.origin_x.min(x1),
            t.origin_y.min(y1),
            t.origin_x.max(x1),
            t.origin_y.max(y1),
        )
    }

    /// Same shape and placement.
    pub fn same_grid(&self, other: &GridTile) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.transform.approx_eq(&other.transform)
    }

    /// Number of cells holding data.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !self.is_nodata(**v)).count()
    }

    /// Mean over valid cells.
    pub fn mean(&self) -> Option<f64> {
        let values: Vec<f64> = self
            .data
            .iter()
            .copied()
            .filter(|v| !self.is_nodata(*v))
            .collect();
        Statistic::Mean.reduce(&values)
    }

    /// Apply `f` to every valid cell; nodata cells stay nodata.
    pub fn map<F>(&self, f: F) -> GridTile
    where
        F: Fn(f64) -> f64,
    {
        let data = self
            .data
            .iter()
            .map(|v| if self.is_nodata(*v) { self.nodata } else { f(*v) })
            .collect();
        GridTile {
            data,
            ..self.clone()
        }
    }

    /// Combine two aligned tiles cell by cell; nodata in either yields nodata.
    pub fn zip_map<F>(&self, other: &GridTile, f: F) -> GridResult<GridTile>
    where
        F: Fn(f64, f64) -> f64,
    {
        if !self.same_grid(other) {
            return Err(GridError::NotAligned(format!(
                "{}x{} vs {}x{}",
                self.width, self.height, other.width, other.height
            )));
        }
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| {
                if self.is_nodata(*a) || other.is_nodata(*b) {
                    self.nodata
                } else {
                    f(*a, *b)
                }
            })
            .collect();
        Ok(GridTile {
            data,
            ..self.clone()
        })
    }

    /// Cell-wise reduction over a stack of aligned tiles.
    ///
    /// Nodata cells are ignored; a cell with no valid value anywhere stays nodata.
    pub fn reduce_stack(tiles: &[&GridTile], statistic: Statistic) -> GridResult<GridTile> {
        let first = tiles.first().ok_or(GridError::Empty)?;
        if let Some(bad) = tiles.iter().find(|t| !first.same_grid(t)) {
            return Err(GridError::NotAligned(format!(
                "stack of {}x{} tiles contains a {}x{} tile",
                first.width, first.height, bad.width, bad.height
            )));
        }
        let mut data = Vec::with_capacity(first.data.len());
        let mut cell = Vec::with_capacity(tiles.len());
        for i in 0..first.data.len() {
            cell.clear();
            cell.extend(tiles.iter().filter_map(|t| {
                let v = t.data[i];
                (!t.is_nodata(v)).then_some(v)
            }));
            data.push(statistic.reduce(&cell).unwrap_or(first.nodata));
        }
        Ok(GridTile {
            data,
            ..(*first).clone()
        })
    }

    /// Cells of a north-up tile touching `bbox`, `None` when they do not overlap.
    pub fn crop(&self, bbox: &BoundingBox) -> Option<GridTile> {
        let t = &self.transform;
        let cell_h = t.pixel_height.abs();
        let col0 = ((bbox.min_x - t.origin_x) / t.pixel_width).floor().max(0.0) as usize;
        let col1 = (((bbox.max_x - t.origin_x) / t.pixel_width).ceil().max(0.0) as usize).min(self.width);
        let row0 = ((t.origin_y - bbox.max_y) / cell_h).floor().max(0.0) as usize;
        let row1 = (((t.origin_y - bbox.min_y) / cell_h).ceil().max(0.0) as usize).min(self.height);
        if col0 >= col1 || row0 >= row1 {
            return None;
        }

        let (w, h) = (col1 - col0, row1 - row0);
        let mut data = Vec::with_capacity(w * h);
        for row in row0..row1 {
            let start = row * self.width + col0;
            data.extend_from_slice(&self.data[start..start + w]);
        }
        Some(GridTile {
            width: w,
            height: h,
            transform: t.offset(col0, row0),
            nodata: self.nodata,
            data,
        })
    }

    /// Split into sub-tiles of at most `tile_size` x `tile_size` cells.
    pub fn split(&self, tile_size: usize) -> Vec<GridTile> {
        let size = tile_size.max(1);
        let mut out = Vec::new();
        for row0 in (0..self.height).step_by(size) {
            for col0 in (0..self.width).step_by(size) {
                let w = size.min(self.width - col0);
                let h = size.min(self.height - row0);
                let mut data = Vec::with_capacity(w * h);
                for row in row0..row0 + h {
                    let start = row * self.width + col0;
                    data.extend_from_slice(&self.data[start..start + w]);
                }
                out.push(GridTile {
                    width: w,
                    height: h,
                    transform: self.transform.offset(col0, row0),
                    nodata: self.nodata,
                    data,
                });
            }
        }
        out
    }
}
