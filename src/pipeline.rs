//! ThreatScorePipeline: sequential batch job
//!
//! generate → ingest → aggregate, each step completing before the next one
//! starts. The store is constructed by the caller and passed in.

use std::path::Path;
use tracing::info;

use crate::aggregate::{AggregationEngine, Assessment};
use crate::config::PipelineConfig;
use crate::dataset::{DatasetGenerator, GenerateOutcome};
use crate::error::ThreatScoreResult;
use crate::ingest::{IngestPipeline, IngestReport};
use crate::model::ThreatScore;
use crate::store::{ElasticsearchStore, RecordStore, SchemaStatus};

/// Summary of the staging steps
#[derive(Debug, Clone)]
pub struct PreparationReport {
    pub schema: SchemaStatus,
    pub dataset: GenerateOutcome,
    pub ingest: IngestReport,
}

/// End-to-end pipeline over one record store
pub struct ThreatScorePipeline<S: RecordStore> {
    store: S,
    config: PipelineConfig,
}

impl ThreatScorePipeline<ElasticsearchStore> {
    /// Pipeline over the Elasticsearch index described by `config.store`
    pub fn elasticsearch(config: PipelineConfig) -> ThreatScoreResult<Self> {
        config.validate()?;
        let store = ElasticsearchStore::new(&config.store)?;
        Ok(Self { store, config })
    }
}

impl<S: RecordStore> ThreatScorePipeline<S> {
    pub fn new(store: S, config: PipelineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn dataset_path(&self) -> &Path {
        &self.config.dataset.path
    }

    /// Create the index if needed
    pub async fn ensure_schema(&self) -> ThreatScoreResult<SchemaStatus> {
        Ok(self.store.ensure_schema().await?)
    }

    /// Write the dataset file unless one already exists
    pub fn generate(&self) -> ThreatScoreResult<GenerateOutcome> {
        DatasetGenerator::new(&self.config.dataset).generate(self.dataset_path())
    }

    /// Write the dataset file unconditionally
    pub fn regenerate(&self) -> ThreatScoreResult<GenerateOutcome> {
        let records = DatasetGenerator::new(&self.config.dataset).regenerate(self.dataset_path())?;
        Ok(GenerateOutcome::Written { records })
    }

    /// Bulk-load the dataset file into the store
    pub async fn ingest(&self) -> ThreatScoreResult<IngestReport> {
        IngestPipeline::new(&self.store, &self.config.ingest)
            .load(self.dataset_path())
            .await
    }

    /// Schema, dataset and ingestion, in that order
    pub async fn prepare(&self) -> ThreatScoreResult<PreparationReport> {
        let schema = self.ensure_schema().await?;
        let dataset = self.generate()?;
        let ingest = self.ingest().await?;
        Ok(PreparationReport {
            schema,
            dataset,
            ingest,
        })
    }

    fn engine(&self) -> AggregationEngine<'_, S> {
        AggregationEngine::new(&self.store, self.config.store.query_limit, &self.config.aggregation)
    }

    /// Department breakdown plus bounded score
    pub async fn assess(&self) -> ThreatScoreResult<Assessment> {
        self.engine().assess().await
    }

    /// Bounded threat score over the current store contents
    pub async fn score(&self) -> ThreatScoreResult<ThreatScore> {
        self.engine().compute_aggregated_score().await
    }

    /// Prepare, then score
    pub async fn run(&self) -> ThreatScoreResult<ThreatScore> {
        self.prepare().await?;
        let score = self.score().await?;
        info!("Aggregated threat score: {}", score);
        Ok(score)
    }
}
