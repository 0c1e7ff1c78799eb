//! Pipeline configuration
//!
//! Every section has defaults matching the reference setup, so an empty
//! YAML document (or no file at all) yields a working configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::aggregate::Weighting;
use crate::model::{DATASET_FILE, DEFAULT_QUERY_LIMIT, DEPARTMENTS, INDEX_NAME};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Record store connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL of the Elasticsearch cluster
    pub url: String,
    /// Index holding the score records
    pub index: String,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Records per bulk request
    pub bulk_chunk_size: usize,
    /// Page size for `query_all`
    pub query_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index: INDEX_NAME.to_string(),
            timeout_ms: 30_000,
            bulk_chunk_size: 500,
            query_limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

/// Synthetic dataset settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Location of the intermediate CSV file
    pub path: PathBuf,
    /// Departments to generate users for
    pub departments: Vec<String>,
    /// Minimum users per department (inclusive)
    pub min_users: u32,
    /// Maximum users per department (exclusive)
    pub max_users: u32,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DATASET_FILE),
            departments: DEPARTMENTS.iter().map(|d| d.to_string()).collect(),
            min_users: 10,
            max_users: 200,
        }
    }
}

/// Ingestion settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Fraction of malformed rows tolerated before the load is refused
    pub max_malformed_fraction: f64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_malformed_fraction: 0.0,
        }
    }
}

/// Aggregation settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub weighting: Weighting,
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub store: StoreConfig,
    pub dataset: DatasetConfig,
    pub ingest: IngestConfig,
    pub aggregation: AggregationConfig,
}

impl PipelineConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let config: PipelineConfig = if yaml.trim().is_empty() {
            PipelineConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let store = &self.store;
        if store.url.trim().is_empty() {
            return Err(ConfigError::Invalid("store.url must not be empty".to_string()));
        }
        if store.index.trim().is_empty() {
            return Err(ConfigError::Invalid("store.index must not be empty".to_string()));
        }
        if store.timeout_ms == 0 {
            return Err(ConfigError::Invalid("store.timeout_ms must be positive".to_string()));
        }
        if store.bulk_chunk_size == 0 {
            return Err(ConfigError::Invalid("store.bulk_chunk_size must be positive".to_string()));
        }
        if store.query_limit == 0 {
            return Err(ConfigError::Invalid("store.query_limit must be positive".to_string()));
        }

        let dataset = &self.dataset;
        if dataset.departments.is_empty() {
            return Err(ConfigError::Invalid("dataset.departments must not be empty".to_string()));
        }
        if dataset.departments.iter().any(|d| d.trim().is_empty()) {
            return Err(ConfigError::Invalid("dataset.departments contains an empty name".to_string()));
        }
        if dataset.min_users >= dataset.max_users {
            return Err(ConfigError::Invalid(format!(
                "dataset.min_users ({}) must be below dataset.max_users ({})",
                dataset.min_users, dataset.max_users
            )));
        }

        let fraction = self.ingest.max_malformed_fraction;
        if !(0.0..=1.0).contains(&fraction) {
            return Err(ConfigError::Invalid(format!(
                "ingest.max_malformed_fraction {} outside [0, 1]",
                fraction
            )));
        }

        Ok(())
    }
}
