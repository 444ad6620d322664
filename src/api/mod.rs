//! API Module
//!
//! HTTP handlers and routing for the local offline API.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /status` - Aggregated offline status
//! - `GET /read/*endpoint` - Read-through with offline fallback
//! - `POST /queue` - Submit a write
//! - `GET /queue`, `GET /queue/:id` - Inspect queued writes
//! - `POST /queue/:id/retry`, `DELETE /queue/:id` - Operator actions on failed writes
//! - `POST /sync` - Drain the queue now
//! - `GET|POST|DELETE /warmup`, `POST /warmup/cancel` - Pre-cache control
//! - `GET /diagnostics/export` - Status, failed writes and recent log events

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
