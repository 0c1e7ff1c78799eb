//! InMemoryStore: in-process record store
//!
//! Keeps records in a `Vec` behind a tokio `RwLock`. No network needed.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{BulkReport, RecordStore, SchemaStatus, StoreError, StoreResult};
use crate::model::{ScoreRecord, StoredRecord, MAX_INDEXED_USER_ID};

/// Record store that lives in the current process.
///
/// Applies the same per-record rules as the index mapping, so a record the
/// cluster would refuse is counted as a bulk failure here too.
pub struct InMemoryStore {
    records: RwLock<Vec<StoredRecord>>,
    schema: AtomicBool,
    available: AtomicBool,
    next_id: AtomicU64,
}

impl InMemoryStore {
    /// Create an empty store without a schema
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            schema: AtomicBool::new(false),
            available: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
        }
    }

    /// Simulate the backing service going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn has_schema(&self) -> bool {
        self.schema.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store switched off".to_string()))
        }
    }

    fn check_record(record: &ScoreRecord) -> Result<(), String> {
        if record.user_id > MAX_INDEXED_USER_ID {
            return Err(format!(
                "user_id {} out of range for integer field",
                record.user_id
            ));
        }
        if !record.score.is_finite() {
            return Err(format!("score {} is not a valid float", record.score));
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn ensure_schema(&self) -> StoreResult<SchemaStatus> {
        self.check_available()?;
        if self.schema.swap(true, Ordering::SeqCst) {
            info!("In-memory index already exists");
            Ok(SchemaStatus::AlreadyExists)
        } else {
            info!("In-memory index created");
            Ok(SchemaStatus::Created)
        }
    }

    async fn bulk_write(&self, records: &[ScoreRecord]) -> StoreResult<BulkReport> {
        self.check_available()?;
        // Writing into a missing collection creates it, as the cluster does.
        self.schema.store(true, Ordering::SeqCst);

        let mut report = BulkReport::default();
        let mut stored = self.records.write().await;
        for record in records {
            match Self::check_record(record) {
                Ok(()) => {
                    let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                    stored.push(StoredRecord {
                        id: format!("mem-{}", id),
                        record: record.clone(),
                    });
                    report.record_success();
                }
                Err(reason) => report.record_failure(reason),
            }
        }

        debug!("In-memory bulk write: {} indexed, {} failed", report.indexed, report.failed);
        Ok(report)
    }

    async fn query_all(&self, limit: usize) -> StoreResult<Vec<StoredRecord>> {
        self.check_available()?;
        let stored = self.records.read().await;
        Ok(stored.iter().take(limit).cloned().collect())
    }

    async fn refresh(&self) -> StoreResult<()> {
        self.check_available()
    }
}
