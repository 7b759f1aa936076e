//! # Configuration Module
//!
//! Loads the application configuration from environment variables (and a
//! `.env` file during development) and turns it into the engine's
//! [`ResearchConfig`].

use anyhow::{Context, Result};
use research_core::{BreadthDecay, ResearchConfig};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

// =============================================================================
// CONFIGURATION STRUCT
// =============================================================================
/// Main configuration for the research service.
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenAI key for the text-generation port
    pub openai_api_key: Option<String>,

    /// Tavily key for the web-search port
    pub tavily_api_key: Option<String>,

    /// When true, requests are rejected unless both keys are present
    pub enable_api_keys: bool,

    /// Model used when a request does not name one
    pub default_model: String,

    /// Sampling temperature; left to the provider when unset
    pub temperature: Option<f64>,

    /// Simultaneous external calls per run
    pub concurrency: usize,

    /// Ceiling on sub-queries per level
    pub max_fan_out: usize,

    /// Search results fetched per sub-query
    pub search_result_limit: usize,

    /// How breadth shrinks between levels
    pub breadth_decay: BreadthDecay,

    /// Deadline of one research run
    pub run_timeout: Duration,

    /// Address the HTTP server binds to
    pub bind_addr: SocketAddr,
}

// =============================================================================
// DEFAULT IMPLEMENTATION
// =============================================================================
impl Default for Config {
    fn default() -> Self {
        let engine = ResearchConfig::default();
        Self {
            openai_api_key: None,
            tavily_api_key: None,
            enable_api_keys: false,
            default_model: "o3-mini".to_string(),
            temperature: None,
            concurrency: engine.concurrency,
            max_fan_out: engine.max_fan_out,
            search_result_limit: engine.search_result_limit,
            breadth_decay: engine.breadth_decay,
            run_timeout: engine.run_timeout,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
        }
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================
impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset variables keep their defaults; set-but-invalid ones are errors.
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (silently ignore if not found)
        let _ = dotenvy::dotenv();

        let mut config = Config::default();

        config.openai_api_key = non_empty_var("OPENAI_API_KEY");
        config.tavily_api_key = non_empty_var("TAVILY_API_KEY");

        if let Ok(val) = env::var("ENABLE_API_KEYS") {
            config.enable_api_keys = val.trim().eq_ignore_ascii_case("true");
        }

        if let Some(val) = non_empty_var("DEFAULT_MODEL") {
            config.default_model = val;
        }

        if let Some(val) = non_empty_var("TEMPERATURE") {
            config.temperature = Some(
                val.parse()
                    .context("TEMPERATURE must be a valid floating-point number (e.g., 0.7)")?,
            );
        }

        if let Some(val) = non_empty_var("RESEARCH_CONCURRENCY") {
            config.concurrency = val
                .parse()
                .context("RESEARCH_CONCURRENCY must be a valid positive integer")?;
        }

        if let Some(val) = non_empty_var("MAX_FAN_OUT") {
            config.max_fan_out = val
                .parse()
                .context("MAX_FAN_OUT must be a valid positive integer")?;
        }

        if let Some(val) = non_empty_var("SEARCH_RESULT_LIMIT") {
            config.search_result_limit = val
                .parse()
                .context("SEARCH_RESULT_LIMIT must be a valid positive integer")?;
        }

        if let Some(val) = non_empty_var("BREADTH_DECAY") {
            config.breadth_decay = val
                .parse()
                .context("BREADTH_DECAY must be one of: halving, decrement, constant")?;
        }

        if let Some(val) = non_empty_var("RESEARCH_TIMEOUT_SECS") {
            let secs: u64 = val
                .parse()
                .context("RESEARCH_TIMEOUT_SECS must be a whole number of seconds")?;
            config.run_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = non_empty_var("BIND_ADDR") {
            config.bind_addr = val
                .parse()
                .with_context(|| format!("BIND_ADDR is not a socket address: {}", val))?;
        }

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                anyhow::bail!(
                    "Temperature must be between 0.0 and 2.0, got: {}",
                    temperature
                );
            }
        }

        if self.default_model.trim().is_empty() {
            anyhow::bail!("DEFAULT_MODEL cannot be empty");
        }

        self.research_config()
            .validate()
            .context("Invalid research settings")?;

        Ok(())
    }

    /// Both provider keys are present
    pub fn has_credentials(&self) -> bool {
        self.openai_api_key.is_some() && self.tavily_api_key.is_some()
    }

    /// Requests may start a run under the API-key policy
    pub fn credentials_satisfied(&self) -> bool {
        !self.enable_api_keys || self.has_credentials()
    }

    /// Engine settings derived from this configuration
    pub fn research_config(&self) -> ResearchConfig {
        ResearchConfig::default()
            .with_concurrency(self.concurrency)
            .with_max_fan_out(self.max_fan_out)
            .with_search_result_limit(self.search_result_limit)
            .with_breadth_decay(self.breadth_decay)
            .with_run_timeout(self.run_timeout)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
