//! Status Module
//!
//! Aggregated offline status for the presentation layer.

mod reporter;

pub use reporter::{StatusReporter, StatusSnapshot};
