//! Ingestion Pipeline
//!
//! Reads the intermediate CSV file, validates every row and bulk-loads the
//! result into a `RecordStore`.
//!
//! Loading is append-only: running it twice over the same file stores every
//! record twice, since the store has no deduplication key.

use csv::StringRecord;
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::Path;
use tracing::{info, warn};

use crate::config::IngestConfig;
use crate::error::{ThreatScoreError, ThreatScoreResult};
use crate::model::{ScoreRecord, DATASET_HEADER};
use crate::store::{BulkReport, RecordStore};

/// Rows parsed out of a dataset file
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// Valid records, in file order
    pub records: Vec<ScoreRecord>,
    /// Data rows seen (header excluded)
    pub rows: usize,
    /// Rows rejected as malformed
    pub skipped: usize,
}

/// Outcome of a `load`
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub rows: usize,
    pub skipped: usize,
    pub bulk: BulkReport,
}

/// Read and validate a dataset file.
///
/// Malformed rows are skipped and counted. When the skipped fraction exceeds
/// `max_malformed_fraction` the whole file is refused with `MalformedRecord`.
pub fn read_dataset(path: impl AsRef<Path>, max_malformed_fraction: f64) -> ThreatScoreResult<Dataset> {
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ThreatScoreError::SourceNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    if !headers.iter().eq(DATASET_HEADER.iter().copied()) {
        return Err(ThreatScoreError::MalformedRecord {
            skipped: 0,
            total: 0,
            first_error: format!(
                "line 1: expected header {:?}, found {:?}",
                DATASET_HEADER.join(","),
                headers.iter().collect::<Vec<_>>().join(",")
            ),
        });
    }

    let mut dataset = Dataset::default();
    let mut first_error: Option<String> = None;

    for (index, row) in reader.records().enumerate() {
        // Line 1 is the header.
        let line = index + 2;
        dataset.rows += 1;

        match row.map_err(|e| e.to_string()).and_then(|row| parse_row(&row)) {
            Ok(record) => dataset.records.push(record),
            Err(reason) => {
                warn!("Skipping dataset line {}: {}", line, reason);
                dataset.skipped += 1;
                first_error.get_or_insert_with(|| format!("line {}: {}", line, reason));
            }
        }
    }

    if dataset.skipped > 0 {
        let fraction = dataset.skipped as f64 / dataset.rows as f64;
        if fraction > max_malformed_fraction {
            return Err(ThreatScoreError::MalformedRecord {
                skipped: dataset.skipped,
                total: dataset.rows,
                first_error: first_error.unwrap_or_default(),
            });
        }
    }

    Ok(dataset)
}

fn parse_row(row: &StringRecord) -> Result<ScoreRecord, String> {
    if row.len() != DATASET_HEADER.len() {
        return Err(format!("expected {} fields, found {}", DATASET_HEADER.len(), row.len()));
    }

    // Department names are kept verbatim; only the numeric fields are trimmed.
    let user_id = row[1]
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("user_id {:?}: {}", &row[1], e))?;
    let score = row[2]
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("score {:?}: {}", &row[2], e))?;

    let record = ScoreRecord::new(&row[0], user_id, score);
    record.validate()?;
    Ok(record)
}

/// Loads dataset files into a record store
pub struct IngestPipeline<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    max_malformed_fraction: f64,
}

impl<'a, S: RecordStore + ?Sized> IngestPipeline<'a, S> {
    pub fn new(store: &'a S, config: &IngestConfig) -> Self {
        Self {
            store,
            max_malformed_fraction: config.max_malformed_fraction,
        }
    }

    /// Read `path` and forward every valid record to `bulk_write`
    pub async fn load(&self, path: impl AsRef<Path>) -> ThreatScoreResult<IngestReport> {
        let path = path.as_ref();
        let dataset = read_dataset(path, self.max_malformed_fraction)?;

        let bulk = self.store.bulk_write(&dataset.records).await?;
        if bulk.indexed > 0 {
            self.store.refresh().await?;
        }

        if bulk.failed > 0 {
            warn!(
                "Store refused {} of {} records from {:?}: {:?}",
                bulk.failed, bulk.submitted, path, bulk.failures
            );
        }
        info!(
            "Loaded {} records from {:?} ({} rows skipped)",
            bulk.indexed, path, dataset.skipped
        );

        Ok(IngestReport {
            rows: dataset.rows,
            skipped: dataset.skipped,
            bulk,
        })
    }
}
