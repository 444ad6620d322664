//! API Routes
//!
//! Configures the Axum router with all local API endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    cancel_warmup_handler, discard_item_handler, export_handler, get_item_handler, health_handler,
    list_queue_handler, read_handler, reset_warmup_handler, retry_item_handler, start_warmup_handler,
    status_handler, submit_handler, sync_handler, warmup_state_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin; the API is meant for a local presentation layer
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/read/*endpoint", get(read_handler))
        .route("/queue", get(list_queue_handler).post(submit_handler))
        .route("/queue/:id", get(get_item_handler).delete(discard_item_handler))
        .route("/queue/:id/retry", post(retry_item_handler))
        .route("/sync", post(sync_handler))
        .route(
            "/warmup",
            get(warmup_state_handler)
                .post(start_warmup_handler)
                .delete(reset_warmup_handler),
        )
        .route("/warmup/cancel", post(cancel_warmup_handler))
        .route("/diagnostics/export", get(export_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
