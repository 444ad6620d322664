//! API Handlers
//!
//! HTTP request handlers for each local API endpoint.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, error, info};

use crate::cache::{CacheStore, QueryParams};
use crate::clock::SharedClock;
use crate::config::Config;
use crate::connectivity::ConnectivityMonitor;
use crate::diagnostics::{DiagnosticsExport, LogBuffer};
use crate::error::{EngineError, Result};
use crate::models::{
    ActionResponse, HealthResponse, QueueItemResponse, QueueListQuery, SubmitRequest,
    SubmitResponse, SyncResponse, WarmupRequest,
};
use crate::queue::{ItemStatus, SyncQueue};
use crate::reader::{OfflineReader, ReadSource};
use crate::status::{StatusReporter, StatusSnapshot};
use crate::storage::Database;
use crate::sync::SyncEngine;
use crate::transport::Transport;
use crate::warmup::{Manifest, PreCacheWarmer, WarmupState};

/// Header naming where a read was served from.
pub const SOURCE_HEADER: &str = "x-offline-source";
/// Header carrying when a served copy was stored.
pub const STORED_AT_HEADER: &str = "x-offline-stored-at";

/// Application state shared across all handlers.
///
/// Every component is wired over one database and one connectivity monitor.
#[derive(Clone)]
pub struct AppState {
    pub cache: CacheStore,
    pub queue: SyncQueue,
    pub monitor: ConnectivityMonitor,
    pub engine: Arc<SyncEngine>,
    pub reader: OfflineReader,
    pub warmer: Arc<PreCacheWarmer>,
    pub reporter: StatusReporter,
    pub logs: LogBuffer,
    pub clock: SharedClock,
    /// Manifest used when POST /warmup carries none
    pub manifest: Option<Arc<Manifest>>,
}

impl AppState {
    /// Wires every component from configuration.
    ///
    /// The monitor starts unreachable; the probe task or a successful call
    /// flips it.
    pub fn new(
        db: Database,
        transport: Arc<dyn Transport>,
        clock: SharedClock,
        config: &Config,
        logs: LogBuffer,
    ) -> Self {
        let cache = CacheStore::new(db.clone(), clock.clone(), config.cache_ttl());
        let queue = SyncQueue::new(db, clock.clone()).with_duplicate_policy(config.duplicate_policy);
        let monitor = ConnectivityMonitor::new(false);

        let engine = Arc::new(SyncEngine::new(
            queue.clone(),
            cache.clone(),
            transport.clone(),
            monitor.clone(),
            clock.clone(),
            config.engine_settings(),
        ));
        let reader = OfflineReader::new(
            cache.clone(),
            transport.clone(),
            monitor.clone(),
            config.request_timeout(),
        );
        let warmer = Arc::new(PreCacheWarmer::new(
            cache.clone(),
            transport,
            clock.clone(),
            config.request_timeout(),
        ));
        let reporter = StatusReporter::new(cache.clone(), queue.clone(), monitor.clone());

        Self {
            cache,
            queue,
            monitor,
            engine,
            reader,
            warmer,
            reporter,
            logs,
            clock,
            manifest: None,
        }
    }

    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = Some(Arc::new(manifest));
        self
    }
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Handler for GET /status
pub async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusSnapshot>> {
    Ok(Json(state.reporter.snapshot()?))
}

/// Handler for GET /read/*endpoint
///
/// Returns the raw response body; the source is reported in a header.
pub async fn read_handler(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
    Query(params): Query<QueryParams>,
) -> Result<Response> {
    let endpoint = format!("/{}", endpoint.trim_start_matches('/'));
    let result = state.reader.read(&endpoint, &params).await?;

    let source = match result.source {
        ReadSource::Network => "network",
        ReadSource::Cache => "cache",
        ReadSource::Stale => "stale",
    };
    let mut response = (
        [(header::CONTENT_TYPE, "application/json")],
        result.payload,
    )
        .into_response();
    let headers = response.headers_mut();
    headers.insert(SOURCE_HEADER, HeaderValue::from_static(source));
    if let Some(stored_at) = result.stored_at {
        if let Ok(value) = HeaderValue::from_str(&stored_at.to_rfc3339()) {
            headers.insert(STORED_AT_HEADER, value);
        }
    }
    Ok(response)
}

/// Handler for POST /queue
pub async fn submit_handler(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>)> {
    if let Some(error_msg) = req.validate() {
        return Err(EngineError::InvalidRequest(error_msg));
    }

    let id = state
        .engine
        .submit(&req.resource_key, req.operation, &req.endpoint, req.payload_bytes())?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            id,
            status: ItemStatus::Pending,
        }),
    ))
}

/// Handler for GET /queue
pub async fn list_queue_handler(
    State(state): State<AppState>,
    Query(query): Query<QueueListQuery>,
) -> Result<Json<Vec<QueueItemResponse>>> {
    let items = state.queue.list(query.status, query.limit())?;
    Ok(Json(items.into_iter().map(QueueItemResponse::from).collect()))
}

/// Handler for GET /queue/:id
pub async fn get_item_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<QueueItemResponse>> {
    let item = state
        .queue
        .get(id)?
        .ok_or_else(|| EngineError::NotFound(format!("queue item {}", id)))?;
    Ok(Json(item.into()))
}

/// Handler for POST /queue/:id/retry
pub async fn retry_item_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ActionResponse>> {
    state.queue.retry(id)?;
    state.engine.schedule_drain();
    Ok(Json(ActionResponse::new(format!("queue item {} re-admitted", id))))
}

/// Handler for DELETE /queue/:id
pub async fn discard_item_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ActionResponse>> {
    state.queue.discard(id)?;
    state.engine.schedule_drain();
    Ok(Json(ActionResponse::new(format!("queue item {} discarded", id))))
}

/// Handler for POST /sync
pub async fn sync_handler(State(state): State<AppState>) -> Result<Json<SyncResponse>> {
    let status = state.engine.drain().await?;
    Ok(Json(SyncResponse {
        status,
        reachable: state.monitor.is_reachable(),
    }))
}

/// Handler for GET /warmup
pub async fn warmup_state_handler(State(state): State<AppState>) -> Json<WarmupState> {
    Json(state.warmer.state())
}

/// Handler for POST /warmup
///
/// Starts a run in the background and returns immediately. An empty body
/// runs the configured manifest; a malformed one is rejected.
pub async fn start_warmup_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<ActionResponse>)> {
    let requested = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<WarmupRequest>(&body)
            .map_err(|e| EngineError::Manifest(e.to_string()))?
            .manifest
    };
    let manifest = match requested {
        Some(manifest) => Arc::new(manifest),
        None => state
            .manifest
            .clone()
            .ok_or_else(|| EngineError::InvalidRequest("no warm-up manifest configured".to_string()))?,
    };
    if state.warmer.is_running() {
        return Err(EngineError::WarmupRunning);
    }

    let entries = manifest.len();
    spawn_warmup(Arc::clone(&state.warmer), manifest);

    Ok((
        StatusCode::ACCEPTED,
        Json(ActionResponse::new(format!("warm-up of {} entries started", entries))),
    ))
}

/// Runs `manifest` on a background task, logging progress.
pub fn spawn_warmup(warmer: Arc<PreCacheWarmer>, manifest: Arc<Manifest>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let result = warmer
            .run(&manifest, |current, total| {
                debug!(current, total, "warm-up progress");
            })
            .await;
        match result {
            Ok(summary) if summary.cancelled => info!("warm-up cancelled"),
            Ok(_) => {}
            Err(EngineError::WarmupRunning) => debug!("warm-up already running"),
            Err(e) => error!(error = %e, "warm-up aborted"),
        }
    })
}

/// Handler for POST /warmup/cancel
pub async fn cancel_warmup_handler(State(state): State<AppState>) -> Json<ActionResponse> {
    let message = if state.warmer.cancel() {
        "cancellation requested"
    } else {
        "no warm-up running"
    };
    Json(ActionResponse::new(message))
}

/// Handler for DELETE /warmup
pub async fn reset_warmup_handler(State(state): State<AppState>) -> Json<ActionResponse> {
    state.warmer.reset();
    Json(ActionResponse::new("warm-up state reset"))
}

/// Handler for GET /diagnostics/export
pub async fn export_handler(State(state): State<AppState>) -> Result<Json<DiagnosticsExport>> {
    let export = DiagnosticsExport::collect(state.clock.now(), &state.reporter, &state.queue, &state.logs)?;
    Ok(Json(export))
}
