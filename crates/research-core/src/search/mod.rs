//! Web-search port
//!
//! [`WebSearch`] is the second external capability the explorer depends on:
//! given a query, return ranked `(url, title, snippet)` results bounded by a
//! result-count limit. [`TavilySearch`] is the production implementation.

mod tavily;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ResearchError;

pub use tavily::{RetryPolicy, SearchDepth, TavilyError, TavilySearch, Topic};

/// A single search hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    /// Page content or summary handed to the learning extractor
    pub snippet: String,
}

impl SearchResult {
    pub fn new(url: impl Into<String>, title: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            snippet: snippet.into(),
        }
    }

    /// Identity key of this result
    pub fn key(&self) -> String {
        normalize_url(&self.url)
    }
}

/// Web-search port
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Search the web for `query`, returning at most `limit` results
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ResearchError>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Canonical form of a url used for set identity.
///
/// Scheme and host are lowercased, the fragment is dropped and a trailing
/// slash is removed. Strings that do not parse as urls are trimmed and
/// lowercased.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match url::Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.as_str().trim_end_matches('/').to_string()
        }
        Err(_) => trimmed.trim_end_matches('/').to_lowercase(),
    }
}
