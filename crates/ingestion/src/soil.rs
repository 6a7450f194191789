//! Soil profile ingestion from DSSAT-style `.SOL` files.
//!
//! A profile starts at a line beginning with `*` and runs until the next one.
//! The third line of a profile carries latitude then longitude in columns
//! 25..42. A leading `*SOILS` header block is not a profile.

use std::path::Path;

use agro_common::GridTile;
use raster_store::{Domain, RasterStore, SoilPoint, TableRef};
use tracing::{info, instrument, warn};

use crate::error::{IngestionError, Result};

const HEADER_MARKER: &str = "*SOILS";
const LOCATION_LINE: usize = 2;
const LOCATION_COLUMNS: std::ops::Range<usize> = 25..42;

/// One parsed profile with its raw text.
#[derive(Debug, Clone, PartialEq)]
pub struct SoilProfile {
    pub lon: f64,
    pub lat: f64,
    pub text: String,
}

/// Parse every profile in a soil file.
pub fn parse_profiles(contents: &str) -> Result<Vec<SoilProfile>> {
    let mut profiles = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    let mut block_start = 0;

    for (i, line) in contents.lines().enumerate() {
        if line.starts_with('*') {
            flush(&block, block_start, &mut profiles)?;
            block.clear();
            block_start = i;
        }
        block.push(line);
    }
    flush(&block, block_start, &mut profiles)?;
    Ok(profiles)
}

fn flush(block: &[&str], start: usize, profiles: &mut Vec<SoilProfile>) -> Result<()> {
    match block.first() {
        Some(first) if first.starts_with('*') && !first.starts_with(HEADER_MARKER) => {}
        _ => return Ok(()),
    }

    let line_no = start + LOCATION_LINE + 1;
    let line = block.get(LOCATION_LINE).ok_or_else(|| IngestionError::SoilProfile {
        line: start + 1,
        reason: "profile has no location line".to_string(),
    })?;
    let end = line.len().min(LOCATION_COLUMNS.end);
    let columns = line
        .get(LOCATION_COLUMNS.start..end)
        .ok_or_else(|| IngestionError::SoilProfile {
            line: line_no,
            reason: "location line is too short".to_string(),
        })?;

    let mut fields = columns.split_whitespace().map(str::parse::<f64>);
    let (lat, lon) = match (fields.next(), fields.next()) {
        (Some(Ok(lat)), Some(Ok(lon))) => (lat, lon),
        _ => {
            return Err(IngestionError::SoilProfile {
                line: line_no,
                reason: format!("cannot read latitude and longitude from '{}'", columns),
            })
        }
    };

    let mut text = block.join("\n");
    text.push('\n');
    profiles.push(SoilProfile { lon, lat, text });
    Ok(())
}

/// Whether a crop mask covers a point. An absent mask covers everything;
/// otherwise the cell must hold a non-zero value.
pub fn mask_covers(mask: Option<&GridTile>, lon: f64, lat: f64) -> bool {
    match mask {
        None => true,
        Some(tile) => tile.value_at(lon, lat).is_some_and(|v| v != 0.0),
    }
}

pub struct SoilIngester {
    store: RasterStore,
}

impl SoilIngester {
    pub fn new(store: RasterStore) -> Self {
        Self { store }
    }

    /// Insert every profile of `contents`, flagged by the two crop masks.
    ///
    /// The batch is atomic: a location already present fails the whole file.
    #[instrument(skip_all, fields(domain = %domain))]
    pub async fn ingest_soil(
        &self,
        domain: &Domain,
        contents: &str,
        mask1: Option<&GridTile>,
        mask2: Option<&GridTile>,
    ) -> Result<u64> {
        self.store.schema.ensure_table(domain, TableRef::Soil).await?;
        let profiles = parse_profiles(contents)?;
        if profiles.is_empty() {
            warn!(domain = %domain, "Soil file holds no profiles");
            return Ok(0);
        }

        let points: Vec<SoilPoint> = profiles
            .into_iter()
            .map(|p| SoilPoint {
                mask1: mask_covers(mask1, p.lon, p.lat),
                mask2: mask_covers(mask2, p.lon, p.lat),
                lon: p.lon,
                lat: p.lat,
                profile: p.text,
            })
            .collect();
        let outside = points.iter().filter(|p| !p.mask1 && !p.mask2).count();

        let inserted = self.store.gateway.insert_soils(domain, &points).await?;
        info!(domain = %domain, inserted, outside_masks = outside, "Soil profiles ingested");
        Ok(inserted)
    }

    pub async fn ingest_soil_file(
        &self,
        domain: &Domain,
        path: &Path,
        mask1: Option<&GridTile>,
        mask2: Option<&GridTile>,
    ) -> Result<u64> {
        let contents = tokio::fs::read_to_string(path).await?;
        self.ingest_soil(domain, &contents, mask1, mask2).await
    }
}
