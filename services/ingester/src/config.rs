//! Service configuration.
//!
//! One YAML document with `store`, `ingestion` and `engine` sections, every
//! key optional. `${VAR}` and `${VAR:-default}` are replaced from the
//! environment before parsing. Without a file each section reads its own
//! environment variables.

use std::path::Path;

use anyhow::{Context, Result};
use ingestion::IngestionConfig;
use raster_store::StoreConfig;
use serde::{Deserialize, Serialize};
use weather_engine::EngineConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub store: StoreConfig,
    pub ingestion: IngestionConfig,
    pub engine: EngineConfig,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            store: StoreConfig::from_env(),
            ingestion: IngestionConfig::from_env(),
            engine: EngineConfig::from_env(),
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;
        serde_yaml::from_str(&expanded).context("Failed to parse configuration YAML")
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// The file when one is given, the environment otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.ingestion.validate()?;
        self.engine.validate()?;
        if self.store.staging_tile_size == 0 {
            anyhow::bail!("store.staging_tile_size must be positive");
        }
        Ok(())
    }
}

/// Replace `${VAR}` and `${VAR:-default}` with environment values.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut expr = String::new();
            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(c) => expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", expr),
                }
            }
            result.push_str(&resolve_var_expr(&expr)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((name, default)) = expr.split_once(":-") {
        match std::env::var(name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim()).with_context(|| format!("Environment variable {} not set", expr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agro_common::Dataset;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = ServiceConfig::from_yaml_str(
            "
store:
  max_connections: 4
engine:
  ensemble_size: 20
  knn_neighbors: 3
ingestion:
  climatology_dataset: prism
",
        )
        .unwrap();
        assert_eq!(config.store.max_connections, 4);
        assert_eq!(config.store.staging_tile_size, 10);
        assert_eq!(config.engine.ensemble_size, 20);
        assert_eq!(config.engine.min_samples, 4);
        assert_eq!(config.ingestion.climatology_dataset, Dataset::Prism);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_substitution() {
        std::env::set_var("CROPCAST_TEST_DB", "postgresql://db/agro");
        std::env::remove_var("CROPCAST_TEST_UNSET");
        let config = ServiceConfig::from_yaml_str(
            "
store:
  database_url: ${CROPCAST_TEST_DB}
ingestion:
  source_root: ${CROPCAST_TEST_UNSET:-/srv/tiles}
",
        )
        .unwrap();
        assert_eq!(config.store.database_url, "postgresql://db/agro");
        assert_eq!(config.ingestion.source_root, std::path::PathBuf::from("/srv/tiles"));
    }

    #[test]
    fn test_missing_variable_is_an_error() {
        std::env::remove_var("CROPCAST_TEST_REQUIRED");
        assert!(expand_env_vars("${CROPCAST_TEST_REQUIRED}").is_err());
        assert!(expand_env_vars("${CROPCAST_TEST_REQUIRED").is_err());
    }

    #[test]
    fn test_invalid_sections_are_rejected() {
        let config = ServiceConfig::from_yaml_str("engine:\n  reanalysis: nmme\n").unwrap();
        assert!(config.validate().is_err());
    }
}
