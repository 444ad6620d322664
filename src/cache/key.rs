//! Cache key normalization.

use std::collections::BTreeMap;
use std::fmt;

/// Query parameters in canonical (sorted) order.
pub type QueryParams = BTreeMap<String, String>;

/// Normalized identity of a read operation: endpoint path plus sorted query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds the key for `endpoint` called with `params`.
    ///
    /// A query string embedded in `endpoint` is merged into `params`; on a
    /// name clash the explicit parameter wins.
    pub fn normalize(endpoint: &str, params: &QueryParams) -> Self {
        let (path, embedded) = split_query(endpoint.trim());

        let mut merged = embedded;
        for (name, value) in params {
            merged.insert(name.clone(), value.clone());
        }

        let mut key = normalize_path(path);
        if !merged.is_empty() {
            let query: Vec<String> = merged
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect();
            key.push('?');
            key.push_str(&query.join("&"));
        }
        Self(key)
    }

    /// Key of a request without parameters.
    pub fn for_endpoint(endpoint: &str) -> Self {
        Self::normalize(endpoint, &QueryParams::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Strips the query from `endpoint`, returning the bare path and its parameters.
pub fn split_query(endpoint: &str) -> (&str, QueryParams) {
    match endpoint.split_once('?') {
        Some((path, query)) => {
            let params = query
                .split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| match pair.split_once('=') {
                    Some((name, value)) => (name.to_string(), value.to_string()),
                    None => (pair.to_string(), String::new()),
                })
                .collect();
            (path, params)
        }
        None => (endpoint, QueryParams::new()),
    }
}

/// Gives the path exactly one leading slash and no trailing one; the root
/// path stays `/`.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    format!("/{}", trimmed)
}
