//! Directory-backed tile source.
//!
//! Tiles are JSON-encoded [`GridTile`]s laid out as:
//!
//! ```text
//! {root}/{dataset}/{variable}/{YYYYMMDD}.json       observations
//! {root}/nmme/{field}/{member:02}/{YYYYMMDD}.json   forecast members
//! ```
//!
//! Fetched tiles are cropped to the requested bounding box.

use std::path::{Path, PathBuf};

use agro_common::{BoundingBox, Dataset, GridTile, Variable};
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{SourceError, SourceResult};
use crate::source::{ForecastField, ForecastSource, ObservationSource};

const DATE_FORMAT: &str = "%Y%m%d";

/// Reads tiles from a local directory tree.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn observation_path(&self, dataset: Dataset, variable: Variable, date: NaiveDate) -> PathBuf {
        self.root
            .join(dataset.as_str())
            .join(variable.as_str())
            .join(format!("{}.json", date.format(DATE_FORMAT)))
    }

    pub fn member_dir(&self, field: ForecastField, member: i32) -> PathBuf {
        self.root
            .join(Dataset::Nmme.as_str())
            .join(field.as_str())
            .join(format!("{:02}", member))
    }

    pub fn forecast_path(&self, field: ForecastField, member: i32, date: NaiveDate) -> PathBuf {
        self.member_dir(field, member)
            .join(format!("{}.json", date.format(DATE_FORMAT)))
    }

    /// Write a tile where the source will look for it.
    pub async fn put_tile(&self, path: &Path, tile: &GridTile) -> SourceResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }
        let body = serde_json::to_vec(tile).map_err(|e| SourceError::InvalidTile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        tokio::fs::write(path, body).await.map_err(|e| io_error(path, e))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> SourceError {
    SourceError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Read a JSON tile from disk.
pub async fn read_tile(path: &Path) -> SourceResult<GridTile> {
    let bytes = tokio::fs::read(path).await.map_err(|e| io_error(path, e))?;
    let tile: GridTile = serde_json::from_slice(&bytes).map_err(|e| SourceError::InvalidTile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    // Deserialization bypasses the shape check in GridTile::new.
    GridTile::new(tile.width, tile.height, tile.transform, tile.nodata, tile.data).map_err(|e| {
        SourceError::InvalidTile {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    })
}

async fn read_cropped(path: &Path, bbox: &BoundingBox, what: String) -> SourceResult<GridTile> {
    if !tokio::fs::try_exists(path).await.map_err(|e| io_error(path, e))? {
        return Err(SourceError::no_data(what));
    }
    let tile = read_tile(path).await?;
    tile.crop(bbox)
        .ok_or_else(|| SourceError::no_data(format!("{} inside {:?}", what, bbox)))
}

#[async_trait]
impl ObservationSource for DirectorySource {
    async fn fetch_grid_tile(
        &self,
        dataset: Dataset,
        variable: Variable,
        date: NaiveDate,
        bbox: &BoundingBox,
    ) -> SourceResult<GridTile> {
        let path = self.observation_path(dataset, variable, date);
        debug!(path = %path.display(), "Reading observation tile");
        read_cropped(&path, bbox, format!("{} {} on {}", dataset, variable, date)).await
    }
}

#[async_trait]
impl ForecastSource for DirectorySource {
    async fn fetch_ensemble_tiles(
        &self,
        field: ForecastField,
        member: i32,
        bbox: &BoundingBox,
    ) -> SourceResult<Vec<(NaiveDate, GridTile)>> {
        let dir = self.member_dir(field, member);
        let what = format!("forecast {} member {}", field, member);
        if !dir.is_dir() {
            return Err(SourceError::no_data(what));
        }

        let mut dated = Vec::new();
        for entry in WalkDir::new(&dir).max_depth(1).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let date = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok());
            match date {
                Some(date) => dated.push((date, path.to_path_buf())),
                None => debug!(path = %path.display(), "Skipping file without a date stem"),
            }
        }
        if dated.is_empty() {
            return Err(SourceError::no_data(what));
        }
        dated.sort_by_key(|(date, _)| *date);

        let mut tiles = Vec::with_capacity(dated.len());
        for (date, path) in dated {
            let tile = read_cropped(&path, bbox, format!("{} on {}", what, date)).await?;
            tiles.push((date, tile));
        }
        Ok(tiles)
    }
}
