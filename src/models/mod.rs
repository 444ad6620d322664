//! Request and Response models for the local API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{QueueListQuery, SubmitRequest, WarmupRequest};
pub use responses::{ActionResponse, HealthResponse, QueueItemResponse, SubmitResponse, SyncResponse};
