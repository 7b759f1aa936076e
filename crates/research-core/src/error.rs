//! Error types for the research engine
//!
//! Every fallible operation in the crate returns [`ResearchError`]. Whether an
//! error is fatal to a run is decided by the caller (see `research::explorer`):
//! branch and planner failures are absorbed, synthesis failures are not.

use std::time::Duration;
use thiserror::Error;

/// Top-level error for research operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResearchError {
    /// Missing credentials, invalid request parameters, bad configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The text-generation provider failed
    #[error("LLM error: {0}")]
    Llm(String),

    /// The web-search provider failed
    #[error("Search error: {0}")]
    Search(String),

    /// The model answered, but not with the requested structure
    #[error("Invalid structured output: {0}")]
    Parse(String),

    /// The run was cancelled (caller abandoned the stream)
    #[error("Research cancelled")]
    Cancelled,

    /// The run exceeded its deadline
    #[error("Research timed out after {0:?}")]
    Timeout(Duration),
}

impl ResearchError {
    /// True for errors caused by the run being stopped from outside
    pub fn is_interruption(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Timeout(_))
    }
}

impl From<serde_json::Error> for ResearchError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}
