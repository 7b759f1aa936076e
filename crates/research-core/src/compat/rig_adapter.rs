//! Adapter for using Rig Agents as the research engine's text generator
//!
//! `RigGenerator` wraps a Rig `Agent<M>` (whose preamble carries the research
//! system prompt) and turns each [`GenerationRequest`] into one completion
//! call. Structured output is requested through the prompt; decoding happens
//! in [`crate::llm::generate_object`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use rig::providers::openai::Client;
//! use rig::client::{CompletionClient, ProviderClient};
//! use research_core::compat::RigGenerator;
//! use research_core::research::prompts;
//!
//! let client = Client::from_env();
//! let agent = client.agent("o3-mini").preamble(&prompts::system_prompt()).build();
//! let generator = RigGenerator::with_names(agent, "openai", "o3-mini");
//! ```

use async_trait::async_trait;
use std::sync::Arc;

use rig::agent::Agent;
use rig::completion::{Completion, CompletionModel, Message as RigMessage};
use rig::message::AssistantContent;
use rig::OneOrMany;

use crate::error::ResearchError;
use crate::llm::{GenerationRequest, LLMConfig, TextGenerator};

/// Adapter that wraps a Rig `Agent<M>` to implement `TextGenerator`.
pub struct RigGenerator<M>
where
    M: CompletionModel + Send + Sync,
{
    agent: Arc<Agent<M>>,
    provider_name: String,
    model_name: String,
    config: Option<LLMConfig>,
}

impl<M> RigGenerator<M>
where
    M: CompletionModel + Send + Sync,
{
    pub fn new(agent: Agent<M>) -> Self {
        Self::with_names(agent, "rig", "rig-agent")
    }

    /// Create adapter with custom provider/model names for logging.
    pub fn with_names(
        agent: Agent<M>,
        provider_name: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            agent: Arc::new(agent),
            provider_name: provider_name.into(),
            model_name: model_name.into(),
            config: None,
        }
    }

    /// Per-call sampling overrides
    pub fn with_config(mut self, config: LLMConfig) -> Self {
        self.config = Some(config);
        self
    }
}

#[async_trait]
impl<M> TextGenerator for RigGenerator<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ResearchError> {
        let prompt = RigMessage::user(request.rendered_prompt());
        let mut builder = self
            .agent
            .completion(prompt, Vec::new())
            .await
            .map_err(|e| ResearchError::Llm(format!("Rig agent error: {}", e)))?;

        if let Some(cfg) = &self.config {
            if let Some(temperature) = cfg.temperature {
                builder = builder.temperature(temperature);
            }
            if let Some(max_tokens) = cfg.max_tokens {
                builder = builder.max_tokens(max_tokens);
            }
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ResearchError::Llm(format!("Rig agent error: {}", e)))?;

        let text = text_from_rig_choice(&response.choice);
        if text.trim().is_empty() {
            return Err(ResearchError::Llm(format!(
                "{} returned an empty response",
                self.model_name
            )));
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        &self.provider_name
    }

    fn model(&self) -> &str {
        &self.model_name
    }
}

/// Concatenate the text parts of a completion, ignoring reasoning and tool calls
fn text_from_rig_choice(choice: &OneOrMany<AssistantContent>) -> String {
    choice
        .iter()
        .filter_map(|item| match item {
            AssistantContent::Text(text) => Some(text.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

impl<M> std::fmt::Debug for RigGenerator<M>
where
    M: CompletionModel + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RigGenerator")
            .field("provider_name", &self.provider_name)
            .field("model_name", &self.model_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_from_choice_joins_text_parts() {
        let choice = OneOrMany::many(vec![
            AssistantContent::text("{\"queries\": "),
            AssistantContent::text("[]}"),
        ])
        .unwrap();

        assert_eq!(text_from_rig_choice(&choice), "{\"queries\": []}");
    }

    #[test]
    fn test_text_from_choice_skips_tool_calls() {
        let choice = OneOrMany::many(vec![
            AssistantContent::text("answer"),
            AssistantContent::tool_call("call_1", "search", serde_json::json!({"q": "rust"})),
        ])
        .unwrap();

        assert_eq!(text_from_rig_choice(&choice), "answer");
    }
}
