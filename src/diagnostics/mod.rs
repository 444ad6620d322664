//! Diagnostics Module
//!
//! Recent log events and an exportable snapshot of engine state.

mod export;
mod log_buffer;

pub use export::DiagnosticsExport;
pub use log_buffer::{LogBuffer, LogBufferLayer, LogEvent};
