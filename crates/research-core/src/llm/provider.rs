//! TextGenerator trait definition
//!
//! The contract every text-generation backend satisfies: given a prompt and an
//! optional structured-output schema, return generated text.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ResearchError;

/// One generation call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// The user prompt
    pub prompt: String,
    /// JSON schema the answer must conform to, if structured output is wanted
    pub schema: Option<Value>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            schema: None,
        }
    }

    /// Request a JSON answer conforming to `schema`
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// The prompt as sent to the model, with schema instructions appended
    pub fn rendered_prompt(&self) -> String {
        match &self.schema {
            Some(schema) => format!(
                "{}\n\nRespond ONLY with a JSON object that conforms to this JSON schema, \
                 with no commentary before or after it:\n```json\n{}\n```",
                self.prompt,
                serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string())
            ),
            None => self.prompt.clone(),
        }
    }
}

/// Text-generation port
///
/// Implementations must be cheap to share across concurrent branches of one
/// run; the engine holds them behind `Arc<dyn TextGenerator>`.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use research_core::llm::{GenerationRequest, TextGenerator};
///
/// struct Echo;
///
/// #[async_trait]
/// impl TextGenerator for Echo {
///     async fn generate(&self, request: &GenerationRequest) -> Result<String, ResearchError> {
///         Ok(request.prompt.clone())
///     }
///
///     fn name(&self) -> &str { "echo" }
///     fn model(&self) -> &str { "echo-1" }
/// }
/// ```
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `request`
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ResearchError>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Model identifier for logging
    fn model(&self) -> &str;
}
