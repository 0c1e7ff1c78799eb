use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{head, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use threatscore::{
    write_dataset, ElasticsearchStore, PipelineConfig, RecordStore, SchemaStatus, ScoreRecord,
    StoreConfig, StoreError, ThreatScoreError, ThreatScorePipeline,
};

/// Minimal stand-in for an Elasticsearch node
#[derive(Default)]
struct FakeCluster {
    indices: HashMap<String, Vec<(String, Value)>>,
    mappings: HashMap<String, Value>,
    next_id: u64,
    bulk_requests: usize,
    refreshes: usize,
    /// Answer 404 to HEAD even when the index exists
    hide_on_head: bool,
    search_delay: Option<Duration>,
    /// 1-based `_bulk` request answered with 429
    throttle_bulk_request: Option<usize>,
}

type Shared = Arc<Mutex<FakeCluster>>;

fn es_error(kind: &str, reason: String) -> Value {
    json!({ "error": { "type": kind, "reason": reason }, "status": 400 })
}

async fn index_exists(State(state): State<Shared>, Path(index): Path<String>) -> StatusCode {
    let cluster = state.lock().unwrap();
    if cluster.indices.contains_key(&index) && !cluster.hide_on_head {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn create_index(
    State(state): State<Shared>,
    Path(index): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut cluster = state.lock().unwrap();
    if cluster.indices.contains_key(&index) {
        return (
            StatusCode::BAD_REQUEST,
            Json(es_error(
                "resource_already_exists_exception",
                format!("index [{}] already exists", index),
            )),
        );
    }
    cluster.indices.insert(index.clone(), Vec::new());
    cluster.mappings.insert(index.clone(), body);
    (StatusCode::OK, Json(json!({ "acknowledged": true, "index": index })))
}

async fn bulk(
    State(state): State<Shared>,
    Path(index): Path<String>,
    body: String,
) -> (StatusCode, Json<Value>) {
    let mut cluster = state.lock().unwrap();
    cluster.bulk_requests += 1;
    if cluster.throttle_bulk_request == Some(cluster.bulk_requests) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(es_error(
                "es_rejected_execution_exception",
                "rejected execution of bulk request".to_string(),
            )),
        );
    }

    let lines: Vec<&str> = body.lines().filter(|l| !l.trim().is_empty()).collect();
    let mut items = Vec::new();
    let mut errors = false;

    for pair in lines.chunks(2) {
        let doc: Value = serde_json::from_str(pair[1]).unwrap();
        let user_id = doc["user_id"].as_u64().unwrap_or(0);

        if user_id > i32::MAX as u64 {
            errors = true;
            items.push(json!({ "index": {
                "status": 400,
                "error": {
                    "type": "mapper_parsing_exception",
                    "reason": "failed to parse field [user_id] of type [integer]"
                }
            }}));
            continue;
        }

        cluster.next_id += 1;
        let id = format!("doc-{}", cluster.next_id);
        cluster
            .indices
            .entry(index.clone())
            .or_default()
            .push((id.clone(), doc));
        items.push(json!({ "index": { "_id": id, "status": 201, "result": "created" } }));
    }

    (
        StatusCode::OK,
        Json(json!({ "took": 1, "errors": errors, "items": items })),
    )
}

async fn search(
    State(state): State<Shared>,
    Path(index): Path<String>,
    Json(query): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let delay = state.lock().unwrap().search_delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let cluster = state.lock().unwrap();
    let docs = match cluster.indices.get(&index) {
        Some(docs) => docs,
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(es_error("index_not_found_exception", format!("no such index [{}]", index))),
            );
        }
    };

    assert_eq!(query["query"], json!({ "match_all": {} }));
    let size = query["size"].as_u64().unwrap_or(10) as usize;
    let hits: Vec<Value> = docs
        .iter()
        .take(size)
        .map(|(id, source)| json!({ "_index": index, "_id": id, "_source": source }))
        .collect();

    (
        StatusCode::OK,
        Json(json!({
            "hits": {
                "total": { "value": docs.len(), "relation": "eq" },
                "hits": hits
            }
        })),
    )
}

async fn refresh(State(state): State<Shared>, Path(_index): Path<String>) -> StatusCode {
    state.lock().unwrap().refreshes += 1;
    StatusCode::OK
}

async fn spawn_cluster(state: Shared) -> String {
    let app = Router::new()
        .route("/:index", head(index_exists).put(create_index))
        .route("/:index/_bulk", post(bulk))
        .route("/:index/_search", post(search))
        .route("/:index/_refresh", post(refresh))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn store_config(url: String) -> StoreConfig {
    StoreConfig {
        url,
        timeout_ms: 2_000,
        bulk_chunk_size: 2,
        ..StoreConfig::default()
    }
}

#[tokio::test]
async fn test_ensure_schema_creates_once() {
    let state = Shared::default();
    let url = spawn_cluster(Arc::clone(&state)).await;
    let store = ElasticsearchStore::new(&store_config(url)).unwrap();

    assert_eq!(store.ensure_schema().await.unwrap(), SchemaStatus::Created);
    assert_eq!(store.ensure_schema().await.unwrap(), SchemaStatus::AlreadyExists);

    let cluster = state.lock().unwrap();
    assert_eq!(cluster.mappings["threat_scores"], ElasticsearchStore::mappings());
}

#[tokio::test]
async fn test_ensure_schema_tolerates_create_race() {
    let state = Shared::default();
    {
        let mut cluster = state.lock().unwrap();
        cluster.indices.insert("threat_scores".to_string(), Vec::new());
        cluster.hide_on_head = true;
    }
    let url = spawn_cluster(Arc::clone(&state)).await;
    let store = ElasticsearchStore::new(&store_config(url)).unwrap();

    assert_eq!(store.ensure_schema().await.unwrap(), SchemaStatus::AlreadyExists);
}

#[tokio::test]
async fn test_bulk_write_chunks_and_counts_failures() {
    let state = Shared::default();
    let url = spawn_cluster(Arc::clone(&state)).await;
    let store = ElasticsearchStore::new(&store_config(url)).unwrap();
    store.ensure_schema().await.unwrap();

    let records = vec![
        ScoreRecord::new("HR", 0, 10.0),
        ScoreRecord::new("HR", 1, 20.0),
        ScoreRecord::new("HR", u32::MAX, 30.0),
        ScoreRecord::new("Finance", 0, 40.0),
        ScoreRecord::new("Finance", 1, 50.0),
    ];
    let report = store.bulk_write(&records).await.unwrap();

    assert_eq!(report.submitted, 5);
    assert_eq!(report.indexed, 4);
    assert_eq!(report.failed, 1);
    assert!(report.failures[0].contains("mapper_parsing_exception"));

    let cluster = state.lock().unwrap();
    assert_eq!(cluster.bulk_requests, 3);
    assert_eq!(cluster.indices["threat_scores"].len(), 4);
}

#[tokio::test]
async fn test_bulk_write_continues_after_refused_chunk() {
    let state = Shared::default();
    state.lock().unwrap().throttle_bulk_request = Some(2);
    let url = spawn_cluster(Arc::clone(&state)).await;
    let store = ElasticsearchStore::new(&store_config(url)).unwrap();
    store.ensure_schema().await.unwrap();

    let records: Vec<_> = (0..6).map(|i| ScoreRecord::new("Finance", i, 10.0)).collect();
    let report = store.bulk_write(&records).await.unwrap();

    assert_eq!(report.submitted, 6);
    assert_eq!(report.indexed, 4);
    assert_eq!(report.failed, 2);
    assert!(
        report.failures.iter().all(|f| f.contains("429") && f.contains("es_rejected_execution_exception")),
        "{:?}",
        report.failures
    );

    let cluster = state.lock().unwrap();
    assert_eq!(cluster.bulk_requests, 3);
    let stored: Vec<u64> = cluster.indices["threat_scores"]
        .iter()
        .map(|(_, doc)| doc["user_id"].as_u64().unwrap())
        .collect();
    assert_eq!(stored, vec![0, 1, 4, 5]);
}

#[tokio::test]
async fn test_bulk_write_rejects_non_finite_locally() {
    let state = Shared::default();
    let url = spawn_cluster(Arc::clone(&state)).await;
    let store = ElasticsearchStore::new(&store_config(url)).unwrap();

    let report = store
        .bulk_write(&[ScoreRecord::new("HR", 0, f64::NAN), ScoreRecord::new("HR", 1, 5.0)])
        .await
        .unwrap();

    assert_eq!(report.indexed, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(state.lock().unwrap().indices["threat_scores"].len(), 1);
}

#[tokio::test]
async fn test_query_all_returns_ids_and_honours_limit() {
    let state = Shared::default();
    let url = spawn_cluster(Arc::clone(&state)).await;
    let store = ElasticsearchStore::new(&store_config(url)).unwrap();
    store.ensure_schema().await.unwrap();

    let records: Vec<_> = (0..5).map(|i| ScoreRecord::new("Science", i, 12.5)).collect();
    store.bulk_write(&records).await.unwrap();

    let all = store.query_all(10_000).await.unwrap();
    assert_eq!(all.len(), 5);
    assert_eq!(all[0].id, "doc-1");
    assert_eq!(all[0].record, ScoreRecord::new("Science", 0, 12.5));

    // Truncated page: only logs a warning
    assert_eq!(store.query_all(2).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_query_missing_index_is_rejected() {
    let state = Shared::default();
    let url = spawn_cluster(state).await;
    let store = ElasticsearchStore::new(&store_config(url)).unwrap();

    match store.query_all(10).await {
        Err(StoreError::Rejected { status, message }) => {
            assert_eq!(status, 404);
            assert!(message.starts_with("index_not_found_exception"), "{}", message);
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_timeout_is_reported() {
    let state = Shared::default();
    {
        let mut cluster = state.lock().unwrap();
        cluster.indices.insert("threat_scores".to_string(), Vec::new());
        cluster.search_delay = Some(Duration::from_secs(3));
    }
    let url = spawn_cluster(Arc::clone(&state)).await;
    let config = StoreConfig {
        timeout_ms: 200,
        ..store_config(url)
    };
    let store = ElasticsearchStore::new(&config).unwrap();

    assert!(matches!(store.query_all(10).await, Err(StoreError::Timeout(_))));
}

#[tokio::test]
async fn test_unreachable_cluster() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = ElasticsearchStore::new(&store_config(format!("http://{}", addr))).unwrap();
    assert!(matches!(store.ensure_schema().await, Err(StoreError::Unavailable(_))));
}

#[tokio::test]
async fn test_pipeline_against_cluster() {
    let state = Shared::default();
    let url = spawn_cluster(Arc::clone(&state)).await;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("threat_scores.csv");
    let fixture: Vec<ScoreRecord> = [10.0, 20.0, 30.0]
        .iter()
        .enumerate()
        .map(|(i, s)| ScoreRecord::new("Engineering", i as u32, *s))
        .chain(std::iter::once(ScoreRecord::new("HR", 0, 40.0)))
        .collect();
    write_dataset(&path, &fixture).unwrap();

    let mut config = PipelineConfig::default();
    config.store = store_config(url);
    config.dataset.path = path;
    let pipeline = ThreatScorePipeline::elasticsearch(config).unwrap();

    // Engineering: 20 + 66.67, HR: 40 + 0
    let score = pipeline.run().await.unwrap();
    assert_eq!(score.value(), 63);

    let cluster = state.lock().unwrap();
    assert_eq!(cluster.indices["threat_scores"].len(), 4);
    assert_eq!(cluster.refreshes, 1);
}

#[tokio::test]
async fn test_empty_dataset_skips_refresh() {
    let state = Shared::default();
    let url = spawn_cluster(Arc::clone(&state)).await;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("threat_scores.csv");
    write_dataset(&path, &[]).unwrap();

    let mut config = PipelineConfig::default();
    config.store = store_config(url);
    config.dataset.path = path;
    let pipeline = ThreatScorePipeline::elasticsearch(config).unwrap();

    pipeline.ensure_schema().await.unwrap();
    let report = pipeline.ingest().await.unwrap();
    assert_eq!(report.rows, 0);
    assert_eq!(report.bulk.submitted, 0);

    let cluster = state.lock().unwrap();
    assert_eq!(cluster.bulk_requests, 0);
    assert_eq!(cluster.refreshes, 0);
}

#[tokio::test]
async fn test_pipeline_maps_store_errors() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = PipelineConfig::default();
    config.store = store_config(format!("http://{}", addr));
    let pipeline = ThreatScorePipeline::elasticsearch(config).unwrap();

    assert!(matches!(
        pipeline.score().await,
        Err(ThreatScoreError::StoreUnavailable(StoreError::Unavailable(_)))
    ));
}
