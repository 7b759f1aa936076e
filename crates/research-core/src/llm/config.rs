//! Generation settings shared by every call of one run

use serde::{Deserialize, Serialize};

/// Model selection and sampling settings
///
/// # Example
///
/// ```
/// use research_core::llm::LLMConfig;
///
/// let config = LLMConfig::new("o3-mini").with_max_tokens(4096);
/// assert_eq!(config.model, "o3-mini");
/// assert_eq!(config.temperature, None);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Model identifier (e.g., "o3-mini", "gpt-4o")
    pub model: String,
    /// Sampling temperature. Left unset for reasoning models that reject it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum tokens to generate in one response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
}

impl LLMConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, tokens: u64) -> Self {
        self.max_tokens = Some(tokens);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = LLMConfig::new("gpt-4o")
            .with_temperature(0.2)
            .with_max_tokens(1024);

        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.temperature, Some(0.2));
        assert_eq!(config.max_tokens, Some(1024));
    }

    #[test]
    fn test_unset_fields_not_serialized() {
        let json = serde_json::to_value(LLMConfig::new("o3-mini")).unwrap();
        assert_eq!(json, serde_json::json!({"model": "o3-mini"}));
    }
}
