//! # Agent Module
//!
//! Wires the two external capabilities into a [`ResearchEngine`]:
//! - text generation through a Rig OpenAI agent carrying the researcher preamble
//! - web search through Tavily
//!
//! Engines are cheap to build, so one is created per request for the
//! requested model.

use rig::client::{CompletionClient, ProviderClient};
use rig::providers::openai::Client;
use std::sync::Arc;
use tracing::debug;

use research_core::research::prompts;
use research_core::{
    LLMConfig, ResearchConfig, ResearchEngine, ResearchError, RigGenerator, TavilySearch, TextGenerator,
    WebSearch,
};

use crate::config::Config;

// =============================================================================
// RESEARCH AGENT STRUCT
// =============================================================================
/// Provider clients plus the settings every engine is built from.
///
/// Missing keys are not an error here: with `ENABLE_API_KEYS=false` the
/// service starts anyway and each request fails with a configuration error.
pub struct ResearchAgent {
    config: Config,
    client: Option<Client>,
    search: Option<Arc<dyn WebSearch>>,
}

impl ResearchAgent {
    pub fn new(config: Config) -> Self {
        let client = config
            .openai_api_key
            .as_ref()
            .map(|key| Client::from_val(key.clone().into()));

        let search = config.tavily_api_key.as_ref().map(|key| {
            Arc::new(TavilySearch::new(key.clone()).with_raw_content(true)) as Arc<dyn WebSearch>
        });

        Self {
            config,
            client,
            search,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve the model a request asked for
    pub fn model_for<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.config.default_model)
    }

    /// Text generator for `model`, preamble dated today
    pub fn generator(&self, model: Option<&str>) -> Result<Arc<dyn TextGenerator>, ResearchError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ResearchError::Config("OPENAI_API_KEY is not set".to_string()))?;
        let model = self.model_for(model);

        let agent = client
            .agent(model)
            .preamble(&prompts::system_prompt())
            .build();

        let mut settings = LLMConfig::new(model);
        if let Some(temperature) = self.config.temperature {
            settings = settings.with_temperature(temperature);
        }

        debug!(model = %model, temperature = ?settings.temperature, "Built generation agent");
        Ok(Arc::new(
            RigGenerator::with_names(agent, "openai", model).with_config(settings),
        ))
    }

    /// Engine for one request
    pub fn engine(&self, model: Option<&str>) -> Result<ResearchEngine, ResearchError> {
        self.engine_with(model, self.config.research_config())
    }

    /// Engine for one request with explicit engine settings
    pub fn engine_with(
        &self,
        model: Option<&str>,
        settings: ResearchConfig,
    ) -> Result<ResearchEngine, ResearchError> {
        let search = self
            .search
            .clone()
            .ok_or_else(|| ResearchError::Config("TAVILY_API_KEY is not set".to_string()))?;
        let generator = self.generator(model)?;
        Ok(ResearchEngine::new(generator, search, settings))
    }

    /// Clarifying questions for a query
    pub async fn feedback(
        &self,
        query: &str,
        num_questions: usize,
        model: Option<&str>,
    ) -> Result<Vec<String>, ResearchError> {
        let engine = self.engine(model)?;
        engine.feedback(query, num_questions).await
    }
}
