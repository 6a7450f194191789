//! Operator CLI for the agro raster store.
//!
//! Onboards domains, ingests reanalysis, forecast, soil and static grids,
//! maintains climatologies and prints reconstructed weather or whole season
//! ensembles as JSON.

mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use agro_common::Dataset;
use config::ServiceConfig;

#[derive(Parser, Debug)]
#[command(name = "ingester")]
#[command(about = "Domain onboarding, raster ingestion and ensemble weather", long_about = None)]
struct Cli {
    /// YAML configuration file; environment variables are used without one
    #[arg(short, long, env = "INGESTER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Overrides store.database_url
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a domain from a GeoJSON boundary file
    Onboard {
        #[arg(short, long)]
        domain: String,

        /// GeoJSON FeatureCollection of sub-regions
        #[arg(short, long)]
        boundary: PathBuf,

        /// Property holding the sub-region name (default from config)
        #[arg(long)]
        admin1_field: Option<String>,

        /// Reanalysis datasets to create tables for
        #[arg(long, value_delimiter = ',', default_value = "era5")]
        datasets: Vec<Dataset>,
    },

    /// Ingest daily reanalysis grids for a date range
    Reanalysis {
        #[arg(short, long)]
        domain: String,

        #[arg(long, default_value = "era5")]
        dataset: Dataset,

        #[arg(long)]
        from: NaiveDate,

        #[arg(long)]
        to: NaiveDate,
    },

    /// Ingest and bias-correct forecast ensemble members
    Forecast {
        #[arg(short, long)]
        domain: String,

        /// Members to ingest (default: every configured member)
        #[arg(long, value_delimiter = ',')]
        members: Vec<i32>,
    },

    /// Build or drop a monthly climatology
    Climatology {
        #[command(subcommand)]
        action: ClimatologyAction,
    },

    /// Store a named static parameter grid
    Static {
        #[arg(short, long)]
        domain: String,

        #[arg(short, long)]
        name: String,

        /// Grid tile file (JSON)
        #[arg(short, long)]
        tile: PathBuf,
    },

    /// Ingest a soil profile file
    Soil {
        #[arg(short, long)]
        domain: String,

        #[arg(short, long)]
        file: PathBuf,

        /// Primary crop mask tile
        #[arg(long)]
        mask1: Option<PathBuf>,

        /// Secondary crop mask tile
        #[arg(long)]
        mask2: Option<PathBuf>,
    },

    /// Print the reconstructed season weather for one point
    Weather {
        #[arg(short, long)]
        domain: String,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(short, long)]
        planting: NaiveDate,

        /// Forecast member (default: drawn at random)
        #[arg(short, long)]
        member: Option<i32>,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Build the season ensemble for a sub-region
    Ensemble {
        #[arg(short, long)]
        domain: String,

        #[arg(short, long)]
        admin1: String,

        #[arg(short, long)]
        planting: NaiveDate,

        /// Sample pairs (default from config)
        #[arg(short, long)]
        size: Option<usize>,

        /// Sample weather at the soil locations
        #[arg(long)]
        co_located: bool,

        #[arg(short, long)]
        member: Option<i32>,

        #[arg(long)]
        seed: Option<u64>,

        /// Write JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum ClimatologyAction {
    Build {
        #[arg(short, long)]
        domain: String,

        #[arg(long, default_value = "era5")]
        dataset: Dataset,
    },
    Drop {
        #[arg(short, long)]
        domain: String,

        #[arg(long, default_value = "era5")]
        dataset: Dataset,
    },
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = fmt().with_env_filter(filter).with_target(true);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.database_url.clone() {
        config.store.database_url = url;
    }
    info!(
        config = ?cli.config,
        reanalysis = %config.engine.reanalysis,
        "Starting ingester"
    );

    commands::run(cli.command, &config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reanalysis_arguments() {
        let cli = Cli::try_parse_from([
            "ingester",
            "reanalysis",
            "--domain",
            "kenya",
            "--dataset",
            "prism",
            "--from",
            "2023-01-01",
            "--to",
            "2023-01-31",
        ])
        .unwrap();
        match cli.command {
            Commands::Reanalysis {
                domain,
                dataset,
                from,
                to,
            } => {
                assert_eq!(domain, "kenya");
                assert_eq!(dataset, Dataset::Prism);
                assert_eq!(from, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
                assert_eq!(to, NaiveDate::from_ymd_opt(2023, 1, 31).unwrap());
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn test_onboard_dataset_list() {
        let cli = Cli::try_parse_from([
            "ingester",
            "onboard",
            "-d",
            "kenya",
            "-b",
            "kenya.geojson",
            "--datasets",
            "era5,prism",
        ])
        .unwrap();
        match cli.command {
            Commands::Onboard { datasets, admin1_field, .. } => {
                assert_eq!(datasets, vec![Dataset::Era5, Dataset::Prism]);
                assert!(admin1_field.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_negative_coordinates_and_global_flags() {
        let cli = Cli::try_parse_from([
            "ingester",
            "weather",
            "-d",
            "andes",
            "--lon",
            "-70.5",
            "--lat",
            "-15.25",
            "-p",
            "2023-10-01",
            "--log-format",
            "pretty",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Pretty);
        match cli.command {
            Commands::Weather { lon, lat, member, seed, .. } => {
                assert_eq!(lon, -70.5);
                assert_eq!(lat, -15.25);
                assert!(member.is_none());
                assert!(seed.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_climatology_subcommand() {
        let cli =
            Cli::try_parse_from(["ingester", "climatology", "drop", "-d", "kenya"]).unwrap();
        match cli.command {
            Commands::Climatology {
                action: ClimatologyAction::Drop { domain, dataset },
            } => {
                assert_eq!(domain, "kenya");
                assert_eq!(dataset, Dataset::Era5);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_unknown_dataset_is_rejected() {
        let result = Cli::try_parse_from([
            "ingester",
            "climatology",
            "build",
            "-d",
            "kenya",
            "--dataset",
            "gfs",
        ]);
        assert!(result.is_err());
    }
}
