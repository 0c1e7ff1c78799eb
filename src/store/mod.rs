//! Record Store Adapter
//!
//! A single logical collection of `ScoreRecord`s inside a queryable index.
//!
//! Implemented by:
//! - `ElasticsearchStore`: talks to an Elasticsearch cluster over HTTP
//! - `InMemoryStore`: in-process, no network (for tests and dry runs)

pub mod elasticsearch;
pub mod memory;

pub use elasticsearch::ElasticsearchStore;
pub use memory::InMemoryStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::model::{ScoreRecord, StoredRecord};

/// Maximum number of per-record failure reasons kept in a `BulkReport`
pub const MAX_REPORTED_FAILURES: usize = 10;

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backing service cannot be reached
    #[error("store unreachable: {0}")]
    Unavailable(String),

    /// Request exceeded the configured timeout
    #[error("store request timed out after {0:?}")]
    Timeout(Duration),

    /// Service answered with an unexpected status
    #[error("store rejected request ({status}): {message}")]
    Rejected {
        status: u16,
        message: String,
    },

    /// Response body could not be decoded
    #[error("unexpected store response: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of `ensure_schema`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStatus {
    Created,
    AlreadyExists,
}

/// Per-record outcome of a bulk write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkReport {
    /// Records handed to the store
    pub submitted: usize,
    /// Records the store accepted
    pub indexed: usize,
    /// Records the store refused
    pub failed: usize,
    /// First few failure reasons
    pub failures: Vec<String>,
}

impl BulkReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    pub(crate) fn record_success(&mut self) {
        self.submitted += 1;
        self.indexed += 1;
    }

    pub(crate) fn record_failure(&mut self, reason: String) {
        self.submitted += 1;
        self.failed += 1;
        if self.failures.len() < MAX_REPORTED_FAILURES {
            self.failures.push(reason);
        }
    }

    /// Fold another chunk's report into this one
    pub fn merge(&mut self, other: BulkReport) {
        self.submitted += other.submitted;
        self.indexed += other.indexed;
        self.failed += other.failed;
        let room = MAX_REPORTED_FAILURES.saturating_sub(self.failures.len());
        self.failures.extend(other.failures.into_iter().take(room));
    }
}

/// Unified interface for the record store.
///
/// Calls are awaited one after another by the pipeline; each call completes
/// or fails before the next step begins.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create the collection with the fixed schema if it does not exist yet
    async fn ensure_schema(&self) -> StoreResult<SchemaStatus>;

    /// Write all records in batched operations.
    ///
    /// Individual record failures, and batches the service refuses as a
    /// whole, do not fail the call; they are counted in the returned report.
    /// Only an unreachable or timed-out service aborts it.
    async fn bulk_write(&self, records: &[ScoreRecord]) -> StoreResult<BulkReport>;

    /// Fetch up to `limit` records, no filter
    async fn query_all(&self, limit: usize) -> StoreResult<Vec<StoredRecord>>;

    /// Make previous writes visible to queries
    async fn refresh(&self) -> StoreResult<()> {
        Ok(())
    }
}
