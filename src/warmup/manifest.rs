//! Warm-up manifest: the ordered list of reads to pre-cache.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::QueryParams;
use crate::error::{EngineError, Result};

/// Pages walked for a paginated entry that declares no page count.
pub const MAX_PAGES: u32 = 100;

/// One read endpoint to pre-cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub endpoint: String,
    #[serde(default)]
    pub params: QueryParams,
    #[serde(default)]
    pub paginated: bool,
    /// Known number of pages; walking stops there even if pages remain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
}

impl ManifestEntry {
    pub fn single(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: QueryParams::new(),
            paginated: false,
            page_count: None,
        }
    }

    pub fn paginated(endpoint: impl Into<String>, page_count: Option<u32>) -> Self {
        Self {
            paginated: true,
            page_count,
            ..Self::single(endpoint)
        }
    }

    /// Upper bound on pages fetched for this entry.
    pub fn page_limit(&self) -> u32 {
        if !self.paginated {
            1
        } else {
            self.page_count.unwrap_or(MAX_PAGES).min(MAX_PAGES)
        }
    }
}

/// Ordered manifest. Accepts either a bare JSON array or `{"entries": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ManifestRepr")]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestRepr {
    List(Vec<ManifestEntry>),
    Object { entries: Vec<ManifestEntry> },
}

impl TryFrom<ManifestRepr> for Manifest {
    type Error = String;

    /// A declared page count of zero would cache nothing yet report success.
    fn try_from(repr: ManifestRepr) -> std::result::Result<Self, Self::Error> {
        let (ManifestRepr::List(entries) | ManifestRepr::Object { entries }) = repr;
        if let Some(entry) = entries.iter().find(|entry| entry.page_count == Some(0)) {
            return Err(format!("entry '{}': page_count must be at least 1", entry.endpoint));
        }
        Ok(Self { entries })
    }
}

impl Manifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| EngineError::Manifest(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Manifest(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
