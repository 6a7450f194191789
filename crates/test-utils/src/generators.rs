//! Test data generators for synthetic grids and daily weather series.
//!
//! These generators create predictable, verifiable test data patterns
//! that can be used across the test suite.

use std::f64::consts::PI;

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use agro_common::grid::DEFAULT_NODATA;
use agro_common::time::year_fraction;
use agro_common::{AlignedSeries, DateRange, GeoTransform, GridTile, Variable};

use crate::fixtures::{GRID_HEIGHT, GRID_WIDTH, test_transform};

/// Creates a tile with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// This makes it easy to verify that data is being read/written correctly
/// by checking that tile.get(col, row) == col * 1000 + row.
///
/// # Example
///
/// ```
/// use test_utils::create_test_tile;
///
/// let tile = create_test_tile(10, 5);
/// assert_eq!(tile.data.len(), 50);
/// assert_eq!(tile.get(1, 0), Some(1000.0));
/// assert_eq!(tile.get(0, 1), Some(1.0));
/// ```
pub fn create_test_tile(width: usize, height: usize) -> GridTile {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f64);
        }
    }
    GridTile {
        width,
        height,
        transform: test_transform(),
        nodata: DEFAULT_NODATA,
        data,
    }
}

/// A tile on the standard test grid filled with one value.
pub fn create_constant_tile(value: f64) -> GridTile {
    GridTile::filled(GRID_WIDTH, GRID_HEIGHT, test_transform(), value)
}

/// Same as [`create_constant_tile`] on an arbitrary grid.
pub fn create_constant_tile_on(width: usize, height: usize, transform: GeoTransform, value: f64) -> GridTile {
    GridTile::filled(width, height, transform, value)
}

/// A temperature-like tile in Kelvin on the standard test grid.
///
/// Values rise from `base` in the top-left corner by 0.5K per column and
/// 0.25K per row.
pub fn create_temperature_tile(base: f64) -> GridTile {
    let mut data = Vec::with_capacity(GRID_WIDTH * GRID_HEIGHT);
    for row in 0..GRID_HEIGHT {
        for col in 0..GRID_WIDTH {
            data.push(base + col as f64 * 0.5 + row as f64 * 0.25);
        }
    }
    GridTile {
        width: GRID_WIDTH,
        height: GRID_HEIGHT,
        transform: test_transform(),
        nodata: DEFAULT_NODATA,
        data,
    }
}

/// A precipitation-like tile (mm) on the standard test grid.
///
/// Uses a simple hash-based approach for reproducibility.
pub fn create_precipitation_tile(seed: u32) -> GridTile {
    let mut data = Vec::with_capacity(GRID_WIDTH * GRID_HEIGHT);
    for row in 0..GRID_HEIGHT {
        for col in 0..GRID_WIDTH {
            let hash = simple_hash(col as u32, row as u32, seed);
            // Most values are 0 (no rain), some are up to 50mm
            let rain = if hash % 4 == 0 {
                (hash % 5000) as f64 / 100.0
            } else {
                0.0
            };
            data.push(rain);
        }
    }
    GridTile {
        width: GRID_WIDTH,
        height: GRID_HEIGHT,
        transform: test_transform(),
        nodata: DEFAULT_NODATA,
        data,
    }
}

/// Simple deterministic hash for reproducible test data.
fn simple_hash(x: u32, y: u32, seed: u32) -> u32 {
    let mut h = seed;
    h = h.wrapping_mul(31).wrapping_add(x);
    h = h.wrapping_mul(31).wrapping_add(y);
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;
    h
}

/// Tile with nodata at the given `(col, row)` positions, `value` elsewhere.
pub fn create_tile_with_nodata(value: f64, nodata_positions: &[(usize, usize)]) -> GridTile {
    let mut tile = create_constant_tile(value);
    for &(col, row) in nodata_positions {
        if col < tile.width && row < tile.height {
            tile.data[row * tile.width + col] = tile.nodata;
        }
    }
    tile
}

/// Known seasonal signal used by reconstruction tests.
#[derive(Debug, Clone, Copy)]
pub struct HarmonicSignal {
    /// Coefficients of `[1, cos 2πt, sin 2πt, cos πt, sin πt]`.
    pub coefficients: [f64; 5],
}

impl HarmonicSignal {
    /// Radiation-like signal in J/m²: mean 18e6 with a 4e6 annual swing.
    pub fn radiation() -> Self {
        Self {
            coefficients: [18.0e6, 3.0e6, 2.0e6, 0.5e6, 0.0],
        }
    }

    pub fn value(&self, date: NaiveDate) -> f64 {
        let t = year_fraction(date);
        let c = &self.coefficients;
        c[0] + c[1] * (2.0 * PI * t).cos()
            + c[2] * (2.0 * PI * t).sin()
            + c[3] * (PI * t).cos()
            + c[4] * (PI * t).sin()
    }

    /// Amplitude of the annual (2πt) component.
    pub fn annual_amplitude(&self) -> f64 {
        self.coefficients[1].hypot(self.coefficients[2])
    }
}

/// Daily weather at one point: tmax/tmin in Kelvin, rain in mm, srad in J/m².
///
/// Radiation follows [`HarmonicSignal::radiation`] plus uniform noise of at
/// most `noise` J/m²; everything else is seeded random around plausible values.
pub fn create_daily_weather(range: DateRange, seed: u64, noise: f64) -> AlignedSeries {
    let mut rng = StdRng::seed_from_u64(seed);
    let signal = HarmonicSignal::radiation();
    let dates: Vec<NaiveDate> = range.days().collect();

    let mut tmax = Vec::with_capacity(dates.len());
    let mut tmin = Vec::with_capacity(dates.len());
    let mut rain = Vec::with_capacity(dates.len());
    let mut srad = Vec::with_capacity(dates.len());
    for date in &dates {
        let t = year_fraction(*date);
        let mean = 293.0 + 5.0 * (2.0 * PI * t).cos();
        let spread = rng.gen_range(6.0..12.0);
        tmax.push(mean + spread / 2.0);
        tmin.push(mean - spread / 2.0);
        rain.push(if rng.gen_bool(0.3) { rng.gen_range(0.5..30.0) } else { 0.0 });
        srad.push(signal.value(*date) + rng.gen_range(-noise..=noise));
    }

    let mut series = AlignedSeries::new(dates);
    for (var, values) in [
        (Variable::Tmax, tmax),
        (Variable::Tmin, tmin),
        (Variable::Rain, rain),
        (Variable::Srad, srad),
    ] {
        series
            .insert_column(var, values)
            .expect("generated columns match the date count");
    }
    series
}
