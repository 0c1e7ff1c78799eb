//! Department Threat Score
//!
//! Aggregates per-user threat scores into one bounded score per organisation,
//! with an Elasticsearch index as the record store.
//!
//! # Components
//!
//! - **Record Store Adapter** (`store`): schema, bulk writes and `match_all`
//!   reads against a single index. `ElasticsearchStore` for the cluster,
//!   `InMemoryStore` for tests and dry runs.
//! - **Dataset Generator** (`dataset`): synthetic department → user → score
//!   data written to `threat_scores.csv`.
//! - **Ingestion Pipeline** (`ingest`): validates the CSV and bulk-loads it.
//! - **Aggregation Engine** (`aggregate`): `mean + population variance` per
//!   department, unweighted mean across departments, truncated into [0, 90].
//!
//! `ThreatScorePipeline` runs them in order.
//!
//! ## Example Usage
//!
//! ```rust
//! use threatscore::{InMemoryStore, PipelineConfig, RecordStore, ScoreRecord, ThreatScorePipeline};
//!
//! #[tokio::main]
//! async fn main() {
//!     let pipeline = ThreatScorePipeline::new(InMemoryStore::new(), PipelineConfig::default());
//!
//!     pipeline.store().bulk_write(&[
//!         ScoreRecord::new("HR", 0, 10.0),
//!         ScoreRecord::new("HR", 1, 12.0),
//!         ScoreRecord::new("Finance", 0, 30.0),
//!     ]).await.unwrap();
//!
//!     // HR: 11 + 1, Finance: 30 + 0
//!     let score = pipeline.score().await.unwrap();
//!     assert_eq!(score.value(), 21);
//! }
//! ```

#![warn(clippy::all)]

pub mod aggregate;
pub mod config;
pub mod dataset;
pub mod error;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod store;

// Re-export main types for convenience
pub use aggregate::{
    aggregate_departments, clamp_score, department_score, group_by_department,
    AggregationEngine, Assessment, DepartmentScore, Weighting,
};
pub use config::{
    AggregationConfig, ConfigError, ConfigResult, DatasetConfig, IngestConfig, PipelineConfig,
    StoreConfig,
};
pub use dataset::{write_dataset, DatasetGenerator, GenerateOutcome};
pub use error::{ThreatScoreError, ThreatScoreResult};
pub use ingest::{read_dataset, Dataset, IngestPipeline, IngestReport};
pub use model::{
    ScoreRecord, StoredRecord, ThreatScore, DATASET_FILE, DEFAULT_QUERY_LIMIT, DEPARTMENTS,
    INDEX_NAME, MAX_SCORE,
};
pub use pipeline::{PreparationReport, ThreatScorePipeline};
pub use store::{
    BulkReport, ElasticsearchStore, InMemoryStore, RecordStore, SchemaStatus, StoreError,
    StoreResult,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
