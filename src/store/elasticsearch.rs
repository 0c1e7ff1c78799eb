//! ElasticsearchStore: record store backed by an Elasticsearch index
//!
//! Uses the REST API directly:
//! - `HEAD /{index}` and `PUT /{index}` for the schema
//! - `POST /{index}/_bulk` (NDJSON) for writes
//! - `POST /{index}/_search` with `match_all` for reads
//! - `POST /{index}/_refresh` to make writes searchable

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Response, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{BulkReport, RecordStore, SchemaStatus, StoreError, StoreResult};
use crate::config::StoreConfig;
use crate::model::{ScoreRecord, StoredRecord};

/// Error type Elasticsearch returns when the create request loses a race
const ALREADY_EXISTS: &str = "resource_already_exists_exception";

/// Network record store talking to an Elasticsearch cluster.
///
/// Every request is bounded by the configured timeout; expiry surfaces as
/// `StoreError::Timeout`.
pub struct ElasticsearchStore {
    client: Client,
    base_url: String,
    index: String,
    timeout: Duration,
    bulk_chunk_size: usize,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorCause,
}

#[derive(Deserialize)]
struct ErrorCause {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    reason: Option<String>,
}

impl ErrorCause {
    fn describe(&self) -> String {
        match &self.reason {
            Some(reason) => format!("{}: {}", self.kind, reason),
            None => self.kind.clone(),
        }
    }
}

#[derive(Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Deserialize)]
struct BulkItem {
    status: u16,
    #[serde(default)]
    error: Option<ErrorCause>,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Deserialize)]
struct SearchHits {
    #[serde(default)]
    total: Option<TotalHits>,
    hits: Vec<SearchHit>,
}

// 7.x and later report an object, 6.x a bare number.
#[derive(Deserialize)]
#[serde(untagged)]
enum TotalHits {
    Object { value: u64 },
    Count(u64),
}

impl TotalHits {
    fn value(&self) -> u64 {
        match self {
            TotalHits::Object { value } => *value,
            TotalHits::Count(value) => *value,
        }
    }
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source")]
    source: ScoreRecord,
}

impl ElasticsearchStore {
    /// Create a store for the index described by `config`.
    ///
    /// No request is made until the first operation.
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            timeout,
            bulk_chunk_size: config.bulk_chunk_size.max(1),
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Index mapping: exact-match department, integer user id, float score
    pub fn mappings() -> serde_json::Value {
        serde_json::json!({
            "mappings": {
                "properties": {
                    "department": { "type": "keyword" },
                    "user_id": { "type": "integer" },
                    "score": { "type": "float" }
                }
            }
        })
    }

    fn index_url(&self, endpoint: &str) -> String {
        if endpoint.is_empty() {
            format!("{}/{}", self.base_url, self.index)
        } else {
            format!("{}/{}/{}", self.base_url, self.index, endpoint)
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::Timeout(self.timeout)
        } else if err.is_decode() {
            StoreError::Serialization(err.to_string())
        } else {
            StoreError::Unavailable(err.to_string())
        }
    }

    /// Turn a non-success response into `StoreError::Rejected`
    async fn rejected(response: Response) -> StoreError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => envelope.error.describe(),
            Err(_) if body.is_empty() => format!("HTTP {}", status),
            Err(_) => body,
        };
        StoreError::Rejected { status, message }
    }

    async fn bulk_chunk(&self, chunk: &[ScoreRecord]) -> StoreResult<BulkReport> {
        let mut report = BulkReport::default();
        let mut body = String::new();
        let mut sent = 0usize;

        for record in chunk {
            // JSON has no NaN/inf; serde_json would silently write null.
            if !record.score.is_finite() {
                report.record_failure(format!("score {} is not a valid float", record.score));
                continue;
            }
            let source = serde_json::to_string(record)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            body.push_str("{\"index\":{}}\n");
            body.push_str(&source);
            body.push('\n');
            sent += 1;
        }

        if sent == 0 {
            return Ok(report);
        }

        let response = self
            .client
            .post(self.index_url("_bulk"))
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let result: BulkResponse = response.json().await.map_err(|e| self.transport_error(e))?;
        if result.errors {
            debug!("Bulk response flagged item errors");
        }

        for item in result.items.iter().take(sent) {
            // Each item is keyed by its action name ("index").
            match item.values().next() {
                Some(outcome) if (200..300).contains(&outcome.status) && outcome.error.is_none() => {
                    report.record_success();
                }
                Some(outcome) => {
                    let reason = outcome
                        .error
                        .as_ref()
                        .map(ErrorCause::describe)
                        .unwrap_or_else(|| format!("HTTP {}", outcome.status));
                    report.record_failure(reason);
                }
                None => report.record_failure("empty bulk item".to_string()),
            }
        }
        for _ in result.items.len()..sent {
            report.record_failure("missing bulk item in response".to_string());
        }

        Ok(report)
    }
}

#[async_trait]
impl RecordStore for ElasticsearchStore {
    async fn ensure_schema(&self) -> StoreResult<SchemaStatus> {
        let url = self.index_url("");

        let response = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            info!("Index '{}' already exists", self.index);
            return Ok(SchemaStatus::AlreadyExists);
        }
        if status != StatusCode::NOT_FOUND {
            return Err(Self::rejected(response).await);
        }

        let response = self
            .client
            .put(&url)
            .json(&Self::mappings())
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if response.status().is_success() {
            info!("Index '{}' created", self.index);
            return Ok(SchemaStatus::Created);
        }

        match Self::rejected(response).await {
            StoreError::Rejected { message, .. } if message.contains(ALREADY_EXISTS) => {
                info!("Index '{}' already exists", self.index);
                Ok(SchemaStatus::AlreadyExists)
            }
            err => Err(err),
        }
    }

    async fn bulk_write(&self, records: &[ScoreRecord]) -> StoreResult<BulkReport> {
        let mut report = BulkReport::default();

        for chunk in records.chunks(self.bulk_chunk_size) {
            // A refused chunk fails its own records only; transport errors abort.
            let chunk_report = match self.bulk_chunk(chunk).await {
                Ok(chunk_report) => chunk_report,
                Err(StoreError::Rejected { status, message }) => {
                    warn!(
                        "Bulk chunk of {} records refused by '{}' ({}): {}",
                        chunk.len(),
                        self.index,
                        status,
                        message
                    );
                    let mut refused = BulkReport::default();
                    for _ in chunk {
                        refused.record_failure(format!("chunk rejected ({}): {}", status, message));
                    }
                    refused
                }
                Err(err) => return Err(err),
            };
            debug!(
                "Bulk chunk into '{}': {} indexed, {} failed",
                self.index, chunk_report.indexed, chunk_report.failed
            );
            report.merge(chunk_report);
        }

        if report.failed > 0 {
            warn!(
                "Bulk write into '{}' refused {} of {} records",
                self.index, report.failed, report.submitted
            );
        }
        Ok(report)
    }

    async fn query_all(&self, limit: usize) -> StoreResult<Vec<StoredRecord>> {
        let query = serde_json::json!({
            "size": limit,
            "query": { "match_all": {} }
        });

        let response = self
            .client
            .post(self.index_url("_search"))
            .json(&query)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let result: SearchResponse = response.json().await.map_err(|e| self.transport_error(e))?;

        let returned = result.hits.hits.len() as u64;
        if let Some(total) = result.hits.total.as_ref().map(TotalHits::value) {
            if total > returned {
                warn!(
                    "Index '{}' holds {} records but only {} were fetched (limit {})",
                    self.index, total, returned, limit
                );
            }
        }

        Ok(result
            .hits
            .hits
            .into_iter()
            .map(|hit| StoredRecord {
                id: hit.id,
                record: hit.source,
            })
            .collect())
    }

    async fn refresh(&self) -> StoreResult<()> {
        let response = self
            .client
            .post(self.index_url("_refresh"))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::rejected(response).await)
        }
    }
}
