//! Structured output helpers
//!
//! Models frequently wrap JSON in markdown fences or add a sentence around it.
//! [`parse_json_response`] accepts all of those shapes.

use serde::de::DeserializeOwned;
use tracing::debug;

use super::provider::{GenerationRequest, TextGenerator};
use crate::error::ResearchError;

/// Run `request` and decode the answer as `T`
pub async fn generate_object<T: DeserializeOwned>(
    generator: &dyn TextGenerator,
    request: &GenerationRequest,
) -> Result<T, ResearchError> {
    let text = generator.generate(request).await?;
    debug!(
        provider = generator.name(),
        model = generator.model(),
        chars = text.len(),
        "Structured generation returned"
    );
    parse_json_response(&text)
}

/// Decode a model answer that should contain one JSON object
pub fn parse_json_response<T: DeserializeOwned>(text: &str) -> Result<T, ResearchError> {
    let trimmed = strip_code_fence(text.trim());

    match serde_json::from_str(trimmed) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            // Fall back to the outermost braces
            let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) else {
                return Err(first_err.into());
            };
            if end <= start {
                return Err(first_err.into());
            }
            serde_json::from_str(&trimmed[start..=end]).map_err(ResearchError::from)
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Skip the info string ("json", "JSON", ...)
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
