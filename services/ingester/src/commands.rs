//! Subcommand handlers.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{info, warn};

use agro_common::{DateRange, GridTile};
use ingestion::{
    load_boundary, read_tile, DirectorySource, ForecastIngester, ReanalysisIngester,
    SoilIngester, StaticIngester,
};
use raster_store::{Domain, RasterStore};
use weather_engine::{EnsembleBuilder, EnsembleRequest, Pairing, WeatherReconstructor};

use crate::config::ServiceConfig;
use crate::{ClimatologyAction, Commands};

pub(crate) async fn run(command: Commands, config: &ServiceConfig) -> Result<()> {
    let store = RasterStore::connect(&config.store)
        .await
        .context("Failed to connect to the raster store")?;

    match command {
        Commands::Onboard {
            domain,
            boundary,
            admin1_field,
            datasets,
        } => {
            let domain = Domain::new(domain)?;
            let field = admin1_field.unwrap_or_else(|| config.ingestion.admin1_field.clone());
            let features = load_boundary(&boundary, &field).await?;
            store.schema.create_domain(&domain, &features, &datasets).await?;
        }

        Commands::Reanalysis {
            domain,
            dataset,
            from,
            to,
        } => {
            let domain = Domain::new(domain)?;
            let range = DateRange::new(from, to)?;
            let source = Arc::new(DirectorySource::new(&config.ingestion.source_root));
            let ingester =
                ReanalysisIngester::new(store, source, config.ingestion.envelope_pad_deg);
            let reports = ingester.ingest_series(&domain, dataset, range).await?;
            let incomplete: Vec<_> = reports.iter().filter(|r| !r.is_complete()).collect();
            for report in &incomplete {
                warn!(date = %report.date, skipped = ?report.skipped, "Day ingested partially");
            }
            info!(
                days = reports.len(),
                incomplete = incomplete.len(),
                "Reanalysis ingestion finished"
            );
        }

        Commands::Forecast { domain, members } => {
            let domain = Domain::new(domain)?;
            let members = if members.is_empty() {
                config.ingestion.members().collect()
            } else {
                members
            };
            let source = Arc::new(DirectorySource::new(&config.ingestion.source_root));
            let ingester = ForecastIngester::new(
                store,
                source,
                config.ingestion.climatology_dataset,
                config.ingestion.forecast_envelope_pad_deg,
            );
            for report in ingester.ingest_forecast(&domain, members).await? {
                info!(
                    member = report.member,
                    temperature_days = report.temperature_days,
                    rain_days = report.rain_days,
                    "Forecast member ingested"
                );
            }
        }

        Commands::Climatology { action } => match action {
            ClimatologyAction::Build { domain, dataset } => {
                let domain = Domain::new(domain)?;
                let rows = store
                    .climatology
                    .build(&domain, dataset, dataset.variables())
                    .await?;
                info!(dataset = %dataset, rows, "Climatology built");
            }
            ClimatologyAction::Drop { domain, dataset } => {
                let domain = Domain::new(domain)?;
                store.climatology.drop(&domain, dataset).await?;
            }
        },

        Commands::Static { domain, name, tile } => {
            let domain = Domain::new(domain)?;
            StaticIngester::new(store)
                .ingest_static_file(&domain, &tile, &name)
                .await?;
        }

        Commands::Soil {
            domain,
            file,
            mask1,
            mask2,
        } => {
            let domain = Domain::new(domain)?;
            let mask1 = read_mask(mask1.as_deref()).await?;
            let mask2 = read_mask(mask2.as_deref()).await?;
            let inserted = SoilIngester::new(store)
                .ingest_soil_file(&domain, &file, mask1.as_ref(), mask2.as_ref())
                .await?;
            info!(inserted, "Soil file ingested");
        }

        Commands::Weather {
            domain,
            lon,
            lat,
            planting,
            member,
            seed,
        } => {
            let domain = Domain::new(domain)?;
            let reconstructor = WeatherReconstructor::new(store, config.engine.clone());
            let window = reconstructor.window(planting)?;
            let mut rng = seeded_rng(seed);
            let weather = reconstructor
                .point_weather(&domain, lon, lat, window, member, &mut rng)
                .await?;
            write_json(&weather, None)?;
        }

        Commands::Ensemble {
            domain,
            admin1,
            planting,
            size,
            co_located,
            member,
            seed,
            output,
        } => {
            let domain = Domain::new(domain)?;
            let mut request = EnsembleRequest::new(admin1, planting);
            request.size = size;
            request.member = member;
            if co_located {
                request.pairing = Pairing::CoLocated;
            }
            let builder = EnsembleBuilder::new(store, config.engine.clone());
            let mut rng = seeded_rng(seed);
            let ensemble = builder.build(&domain, &request, &mut rng).await?;
            info!(
                members = ensemble.members.len(),
                skipped = ensemble.skipped,
                "Ensemble built"
            );
            write_json(&ensemble, output.as_deref())?;
        }
    }

    Ok(())
}

async fn read_mask(path: Option<&Path>) -> Result<Option<GridTile>> {
    match path {
        Some(path) => {
            let tile = read_tile(path)
                .await
                .with_context(|| format!("Failed to read mask {}", path.display()))?;
            Ok(Some(tile))
        }
        None => Ok(None),
    }
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Output written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agro_common::Dataset;
    use rand::Rng;

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let mut a = seeded_rng(Some(7));
        let mut b = seeded_rng(Some(7));
        for _ in 0..4 {
            assert_eq!(a.gen::<u64>(), b.gen::<u64>());
        }
    }

    #[test]
    fn test_write_json_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_json(&Dataset::Prism, Some(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "\"prism\"");
    }

    #[tokio::test]
    async fn test_missing_mask_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_mask(None).await.unwrap().is_none());
        assert!(read_mask(Some(&dir.path().join("absent.json"))).await.is_err());
    }
}
