//! Integration Tests for API Endpoints
//!
//! Drives the full router against an in-memory database and a scripted
//! remote.

mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use common::ScriptedTransport;
use offline_sync::api::handlers::SOURCE_HEADER;
use offline_sync::diagnostics::LogBuffer;
use offline_sync::error::TransportError;
use offline_sync::{create_router, AppState, Config, Database, ManualClock};

// == Helper Functions ==

struct TestApp {
    router: Router,
    state: AppState,
    clock: Arc<ManualClock>,
    transport: Arc<ScriptedTransport>,
}

fn create_test_app() -> TestApp {
    let clock = ManualClock::starting_now();
    let transport = ScriptedTransport::new();
    let state = AppState::new(
        Database::in_memory().unwrap(),
        transport.clone(),
        clock.clone(),
        &Config::default(),
        LogBuffer::new(64),
    );
    TestApp {
        router: create_router(state.clone()),
        state,
        clock,
        transport,
    }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> axum::response::Response {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

const PATIENT_UPDATE: &str =
    r#"{"resource_key":"patient:7","operation":"update","endpoint":"/patients/7","payload":{"name":"Ada"}}"#;

// == Queue Endpoint Tests ==

#[tokio::test]
async fn test_submit_while_offline_is_accepted_and_listed() {
    let app = create_test_app();

    let response = send(&app.router, "POST", "/queue", Some(PATIENT_UPDATE)).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "pending");
    let id = json["id"].as_i64().unwrap();

    let response = send(&app.router, "GET", "/queue?status=pending", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let items = body_to_json(response.into_body()).await;
    assert_eq!(items.as_array().unwrap().len(), 1);
    assert_eq!(items[0]["id"], id);
    assert_eq!(items[0]["payload"]["name"], "Ada");

    let response = send(&app.router, "GET", &format!("/queue/{}", id), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let item = body_to_json(response.into_body()).await;
    assert_eq!(item["resource_key"], "patient:7");
    assert_eq!(item["attempts"], 0);
}

#[tokio::test]
async fn test_submit_rejects_invalid_body() {
    let app = create_test_app();

    let response = send(
        &app.router,
        "POST",
        "/queue",
        Some(r#"{"resource_key":"","operation":"update","endpoint":"/patients/7"}"#),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &app.router,
        "POST",
        "/queue",
        Some(r#"{"resource_key":"patient:7","operation":"upsert","endpoint":"/patients/7"}"#),
    )
    .await;
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_get_unknown_item_returns_404() {
    let app = create_test_app();

    let response = send(&app.router, "GET", "/queue/999", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = body_to_json(response.into_body()).await;
    assert!(json.get("error").is_some());
}

#[tokio::test]
async fn test_sync_drains_when_reachable() {
    let app = create_test_app();
    send(&app.router, "POST", "/queue", Some(PATIENT_UPDATE)).await;

    // Offline: nothing moves
    let response = send(&app.router, "POST", "/sync", None).await;
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["pending_count"], 1);
    assert_eq!(json["reachable"], false);

    app.state.monitor.set_reachable(true);
    let response = send(&app.router, "POST", "/sync", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["pending_count"], 0);
    assert_eq!(json["reachable"], true);
    assert_eq!(app.transport.dispatched(), vec![r#"{"name":"Ada"}"#]);
}

#[tokio::test]
async fn test_retry_and_discard_failed_item() {
    let app = create_test_app();
    app.transport
        .fail_dispatch("/patients/7", TransportError::Rejected("bad name".into()), 1);

    let response = send(&app.router, "POST", "/queue", Some(PATIENT_UPDATE)).await;
    let id = body_to_json(response.into_body()).await["id"].as_i64().unwrap();

    // Only failed items can be discarded
    let response = send(&app.router, "DELETE", &format!("/queue/{}", id), None).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    app.state.monitor.set_reachable(true);
    app.state.engine.drain().await.unwrap();

    let response = send(&app.router, "GET", "/queue?status=failed", None).await;
    let failed = body_to_json(response.into_body()).await;
    assert_eq!(failed[0]["last_error"], "remote rejected payload: bad name");

    // Take the monitor down so the retry does not trigger a background drain
    app.state.monitor.set_reachable(false);
    let response = send(&app.router, "POST", &format!("/queue/{}/retry", id), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let item = app.state.queue.get(id).unwrap().unwrap();
    assert_eq!(item.attempts, 0);

    app.state.monitor.set_reachable(true);
    app.transport
        .fail_dispatch("/patients/7", TransportError::Rejected("still bad".into()), 1);
    app.state.engine.drain().await.unwrap();

    let response = send(&app.router, "DELETE", &format!("/queue/{}", id), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.state.queue.get(id).unwrap().is_none());
}

// == Read Endpoint Tests ==

#[tokio::test]
async fn test_read_falls_back_to_cache_and_stale_copy() {
    let app = create_test_app();
    app.transport.serve("/patients?page=1", br#"[{"id":7}]"#);
    app.state.monitor.set_reachable(true);

    let response = send(&app.router, "GET", "/read/patients?page=1", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[SOURCE_HEADER], "network");

    app.transport.set_offline(true);
    app.state.monitor.set_reachable(false);

    let response = send(&app.router, "GET", "/read/patients?page=1", None).await;
    assert_eq!(response.headers()[SOURCE_HEADER], "cache");
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json[0]["id"], 7);

    app.clock.advance(chrono::Duration::days(31));
    let response = send(&app.router, "GET", "/read/patients?page=1", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[SOURCE_HEADER], "stale");
}

#[tokio::test]
async fn test_read_with_nothing_cached_offline_is_unavailable() {
    let app = create_test_app();

    let response = send(&app.router, "GET", "/read/clinics", None).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// == Status & Diagnostics Tests ==

#[tokio::test]
async fn test_status_reports_queue_and_connectivity() {
    let app = create_test_app();
    send(&app.router, "POST", "/queue", Some(PATIENT_UPDATE)).await;

    let response = send(&app.router, "GET", "/status", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["pending"], 1);
    assert_eq!(json["queued"], 1);
    assert_eq!(json["reachable"], false);
}

#[tokio::test]
async fn test_diagnostics_export_lists_failed_items() {
    let app = create_test_app();
    app.transport
        .fail_dispatch("/patients/7", TransportError::Rejected("bad name".into()), 1);
    send(&app.router, "POST", "/queue", Some(PATIENT_UPDATE)).await;
    app.state.monitor.set_reachable(true);
    app.state.engine.drain().await.unwrap();

    let response = send(&app.router, "GET", "/diagnostics/export", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"]["failed"], 1);
    assert_eq!(json["failed_items"].as_array().unwrap().len(), 1);
    assert!(json["events"].is_array());
}

// == Warm-up Endpoint Tests ==

#[tokio::test]
async fn test_warmup_without_manifest_is_bad_request() {
    let app = create_test_app();

    let response = send(&app.router, "POST", "/warmup", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_warmup_runs_supplied_manifest() {
    let app = create_test_app();
    app.transport.serve("/roles", br#"["admin"]"#);

    let response = send(
        &app.router,
        "POST",
        "/warmup",
        Some(r#"{"manifest":[{"endpoint":"/roles"}]}"#),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    for _ in 0..100 {
        if app.state.warmer.is_completed() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let response = send(&app.router, "GET", "/warmup", None).await;
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["completed"], true);
    assert_eq!(json["running"], false);
    assert!(app.state.cache.get("/roles").unwrap().is_some());

    let response = send(&app.router, "DELETE", "/warmup", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!app.state.warmer.is_completed());
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app();

    let response = send(&app.router, "GET", "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "healthy");
}
