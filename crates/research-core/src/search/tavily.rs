//! Tavily web search
//!
//! Posts queries to the Tavily `/search` endpoint with bearer auth. Transient
//! failures (transport errors, 429, 5xx) are retried under a [`RetryPolicy`]
//! with doubling delays; everything else fails the call immediately.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{SearchResult, WebSearch};
use crate::error::ResearchError;

const TAVILY_API: &str = "https://api.tavily.com";

/// Upper bound Tavily accepts for `max_results`
const RESULT_CAP: usize = 20;

/// How much of an error body is kept in a [`TavilyError`]
const ERROR_BODY_CHARS: usize = 200;

/// `search_depth` request field
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    #[default]
    Basic,
    Advanced,
}

/// `topic` request field
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    #[default]
    General,
    News,
}

/// Retry schedule for transient failures.
///
/// Attempt `n` (1-based, after the first try) waits `base_delay * 2^(n-1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn delay_before(&self, retry: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(retry.saturating_sub(1))
    }
}

/// Failure of one Tavily call
#[derive(Debug, thiserror::Error)]
pub enum TavilyError {
    #[error("request timed out")]
    Timeout,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("Unauthorized: Tavily rejected the API key")]
    Unauthorized,

    #[error("Rate limited by Tavily")]
    RateLimited,

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not parse response: {0}")]
    Decode(String),
}

impl TavilyError {
    /// Worth another attempt
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) | Self::RateLimited => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Unauthorized | Self::Decode(_) => false,
        }
    }

    fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized,
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
            _ => Self::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_CHARS).collect(),
            },
        }
    }
}

impl From<reqwest::Error> for TavilyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<TavilyError> for ResearchError {
    fn from(e: TavilyError) -> Self {
        ResearchError::Search(format!("tavily: {}", e))
    }
}

/// [`WebSearch`] over the Tavily API
///
/// ```ignore
/// let search = TavilySearch::new(key).with_raw_content(true);
/// let hits = search.search("rust async runtimes", 5).await?;
/// ```
#[derive(Debug, Clone)]
pub struct TavilySearch {
    http: Client,
    api_key: String,
    endpoint: String,
    request_timeout: Duration,
    retry: RetryPolicy,
    depth: SearchDepth,
    topic: Topic,
    raw_content: bool,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            endpoint: format!("{}/search", TAVILY_API),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            depth: SearchDepth::default(),
            topic: Topic::default(),
            raw_content: false,
        }
    }

    /// Read the key from `TAVILY_API_KEY`
    pub fn from_env() -> Result<Self, ResearchError> {
        std::env::var("TAVILY_API_KEY")
            .map(Self::new)
            .map_err(|_| ResearchError::Config("TAVILY_API_KEY is not set".to_string()))
    }

    /// Alternate API host, e.g. a proxy or a mock server
    pub fn with_base_url(mut self, base: impl AsRef<str>) -> Self {
        self.endpoint = format!("{}/search", base.as_ref().trim_end_matches('/'));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_search_depth(mut self, depth: SearchDepth) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_topic(mut self, topic: Topic) -> Self {
        self.topic = topic;
        self
    }

    /// Request full page text alongside the summary
    pub fn with_raw_content(mut self, raw_content: bool) -> Self {
        self.raw_content = raw_content;
        self
    }

    async fn post_once(&self, body: &SearchBody<'_>) -> Result<SearchReply, TavilyError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TavilyError::from_status(status, text));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| TavilyError::Decode(e.to_string()))
    }

    async fn post(&self, body: &SearchBody<'_>) -> Result<SearchReply, TavilyError> {
        let mut retry = 0;
        loop {
            match self.post_once(body).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_transient() && retry < self.retry.retries => {
                    retry += 1;
                    let delay = self.retry.delay_before(retry);
                    warn!(error = %e, retry, delay_ms = delay.as_millis() as u64, "Tavily call failed, backing off");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl WebSearch for TavilySearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ResearchError> {
        let limit = limit.clamp(1, RESULT_CAP);
        info!(query = %query, limit, "Searching the web");

        let body = SearchBody {
            query,
            max_results: limit,
            search_depth: self.depth,
            topic: self.topic,
            include_answer: false,
            include_raw_content: self.raw_content,
        };
        let reply = self.post(&body).await?;

        let hits: Vec<SearchResult> = reply
            .results
            .into_iter()
            .take(limit)
            .map(SearchResult::from)
            .collect();

        debug!(query = %query, hits = hits.len(), "Search returned");
        Ok(hits)
    }

    fn name(&self) -> &str {
        "tavily"
    }
}

#[derive(Debug, Serialize)]
struct SearchBody<'q> {
    query: &'q str,
    max_results: usize,
    search_depth: SearchDepth,
    topic: Topic,
    include_answer: bool,
    include_raw_content: bool,
}

#[derive(Debug, Deserialize)]
struct SearchReply {
    #[serde(default)]
    results: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    raw_content: Option<String>,
}

impl From<Hit> for SearchResult {
    /// The page body wins over the summary when Tavily sent one
    fn from(hit: Hit) -> Self {
        let snippet = hit
            .raw_content
            .filter(|raw| !raw.trim().is_empty())
            .unwrap_or(hit.content);
        SearchResult::new(hit.url, hit.title, snippet)
    }
}


#[cfg(test)]
mod http_tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn two_hits() -> serde_json::Value {
        serde_json::json!({
            "answer": null,
            "results": [
                {"title": "Tokio", "url": "https://tokio.rs", "content": "An async runtime.", "score": 0.9},
                {"title": "async-std", "url": "https://async.rs", "content": "Another runtime.", "score": 0.7}
            ]
        })
    }

    fn against(server: &MockServer, retries: u32) -> TavilySearch {
        TavilySearch::new("tvly-test")
            .with_base_url(server.uri())
            .with_timeout(Duration::from_secs(5))
            .with_retry(RetryPolicy {
                retries,
                base_delay: Duration::from_millis(10),
            })
    }

    #[tokio::test]
    async fn test_http_search_sends_bearer_and_maps_hits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("Authorization", "Bearer tvly-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(two_hits()))
            .mount(&server)
            .await;

        let hits = against(&server, 0).search("async runtimes", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://tokio.rs");
        assert_eq!(hits[1].snippet, "Another runtime.");
    }

    #[tokio::test]
    async fn test_http_results_truncated_to_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(two_hits()))
            .mount(&server)
            .await;

        let hits = against(&server, 0).search("async", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_http_unauthorized_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let err = against(&server, 3).search("q", 5).await.unwrap_err();
        assert!(err.to_string().contains("Unauthorized"));
    }

    #[tokio::test]
    async fn test_http_server_errors_retried_then_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .expect(3)
            .mount(&server)
            .await;

        let err = against(&server, 2).search("q", 5).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_http_garbage_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = against(&server, 0).search("q", 5).await.unwrap_err();
        assert!(err.to_string().contains("parse"));
    }
}
