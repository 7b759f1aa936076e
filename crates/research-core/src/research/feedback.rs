//! Feedback generator: clarifying questions before a run

use serde::Deserialize;
use std::sync::Arc;

use crate::error::ResearchError;
use crate::llm::{generate_object, TextGenerator};

use super::prompts;

#[derive(Debug, Deserialize)]
struct Questions {
    questions: Vec<String>,
}

#[derive(Clone)]
pub struct FeedbackGenerator {
    generator: Arc<dyn TextGenerator>,
}

impl FeedbackGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Up to `num_questions` questions. `Ok(vec![])` means the model asked
    /// nothing; a failed call is always an `Err`.
    pub async fn feedback(
        &self,
        query: &str,
        num_questions: usize,
    ) -> Result<Vec<String>, ResearchError> {
        if num_questions == 0 {
            return Ok(Vec::new());
        }
        let request = prompts::feedback_request(query, num_questions);
        let answer: Questions = generate_object(self.generator.as_ref(), &request).await?;
        Ok(answer
            .questions
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .take(num_questions)
            .collect())
    }
}

impl std::fmt::Debug for FeedbackGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackGenerator")
            .field("generator", &self.generator.name())
            .finish()
    }
}
