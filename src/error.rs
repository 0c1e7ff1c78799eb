//! Error types for the threat-score pipeline

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;

/// Errors surfaced to the caller of any pipeline step
#[derive(Error, Debug)]
pub enum ThreatScoreError {
    /// Backing index unreachable, timed out, or refused a request
    #[error("Record store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// Intermediate dataset file is missing
    #[error("Dataset not found at {}; generate it first", .0.display())]
    SourceNotFound(PathBuf),

    /// Too many dataset rows failed to parse or validate
    #[error("Malformed dataset: {skipped} of {total} rows rejected (first: {first_error})")]
    MalformedRecord {
        skipped: usize,
        total: usize,
        first_error: String,
    },

    /// Aggregation attempted over an empty corpus
    #[error("No records to aggregate")]
    NoData,

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// CSV encoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ThreatScoreResult<T> = Result<T, ThreatScoreError>;
