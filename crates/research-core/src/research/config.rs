//! Engine tuning knobs

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ResearchError;
use crate::progress::TERMINAL_WRITE_TIMEOUT;

use super::schedule::BreadthDecay;

/// Configuration for one research engine.
///
/// # Example
///
/// ```
/// use research_core::research::ResearchConfig;
/// use std::time::Duration;
///
/// let config = ResearchConfig::new()
///     .with_concurrency(4)
///     .with_run_timeout(Duration::from_secs(120));
///
/// assert_eq!(config.concurrency, 4);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Upper bound on sub-queries planned per level, whatever the breadth
    pub max_fan_out: usize,

    /// Simultaneous external calls (search and generation) across a run
    pub concurrency: usize,

    /// Results requested from the search port per sub-query
    pub search_result_limit: usize,

    /// Learnings requested per extraction call
    pub learnings_per_extraction: usize,

    /// Characters of each result kept in an extraction prompt
    pub content_char_limit: usize,

    /// Clarifying questions generated at the start of a run
    pub feedback_questions: usize,

    /// Whether a run starts with the feedback step
    pub include_feedback: bool,

    /// Breadth policy between levels
    pub breadth_decay: BreadthDecay,

    /// Deadline for exploration plus synthesis
    #[serde(with = "humantime_serde")]
    pub run_timeout: Duration,

    /// Longest wait for a stalled consumer to accept the terminal event
    #[serde(with = "humantime_serde")]
    pub event_write_timeout: Duration,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_fan_out: 10,
            concurrency: 2,
            search_result_limit: 5,
            learnings_per_extraction: 3,
            content_char_limit: 25_000,
            feedback_questions: 3,
            include_feedback: true,
            breadth_decay: BreadthDecay::Halving,
            run_timeout: Duration::from_secs(600),
            event_write_timeout: TERMINAL_WRITE_TIMEOUT,
        }
    }
}

impl ResearchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_fan_out(mut self, max: usize) -> Self {
        self.max_fan_out = max;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_search_result_limit(mut self, limit: usize) -> Self {
        self.search_result_limit = limit;
        self
    }

    pub fn with_learnings_per_extraction(mut self, count: usize) -> Self {
        self.learnings_per_extraction = count;
        self
    }

    pub fn with_content_char_limit(mut self, limit: usize) -> Self {
        self.content_char_limit = limit;
        self
    }

    pub fn with_feedback_questions(mut self, count: usize) -> Self {
        self.feedback_questions = count;
        self
    }

    pub fn with_feedback(mut self, enabled: bool) -> Self {
        self.include_feedback = enabled;
        self
    }

    pub fn with_breadth_decay(mut self, decay: BreadthDecay) -> Self {
        self.breadth_decay = decay;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn with_event_write_timeout(mut self, timeout: Duration) -> Self {
        self.event_write_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ResearchError> {
        if self.max_fan_out == 0 {
            return Err(ResearchError::Config("max_fan_out must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(ResearchError::Config("concurrency must be at least 1".into()));
        }
        if self.search_result_limit == 0 {
            return Err(ResearchError::Config(
                "search_result_limit must be at least 1".into(),
            ));
        }
        if self.learnings_per_extraction == 0 {
            return Err(ResearchError::Config(
                "learnings_per_extraction must be at least 1".into(),
            ));
        }
        if self.run_timeout.is_zero() {
            return Err(ResearchError::Config("run_timeout must be non-zero".into()));
        }
        if self.event_write_timeout.is_zero() {
            return Err(ResearchError::Config(
                "event_write_timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResearchConfig::default();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.search_result_limit, 5);
        assert_eq!(config.learnings_per_extraction, 3);
        assert_eq!(config.breadth_decay, BreadthDecay::Halving);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_concurrency_floor() {
        assert_eq!(ResearchConfig::new().with_concurrency(0).concurrency, 1);
    }

    #[test]
    fn test_invalid() {
        assert!(ResearchConfig::new().with_max_fan_out(0).validate().is_err());
        assert!(ResearchConfig::new()
            .with_run_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(ResearchConfig::new()
            .with_event_write_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_humantime_roundtrip() {
        let config = ResearchConfig::new().with_run_timeout(Duration::from_secs(90));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["run_timeout"], "1m 30s");
        assert_eq!(json["breadth_decay"], "halving");
    }
}
