//! Learning extractor: search results to atomic findings

use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::error::ResearchError;
use crate::llm::{generate_object, TextGenerator};
use crate::search::SearchResult;

use super::prompts;
use super::state::{normalize_text, Learning, SubQuery};

/// Output of one extraction call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub learnings: Vec<Learning>,
    pub follow_up_questions: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractedBatch {
    #[serde(default)]
    learnings: Vec<RawLearning>,
    #[serde(default)]
    follow_up_questions: Vec<String>,
}

/// Models sometimes ignore the citation field and answer with plain strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawLearning {
    Cited {
        text: String,
        #[serde(default)]
        sources: Vec<i64>,
    },
    Plain(String),
}

/// Asks the generator for a bounded set of learnings per result batch
#[derive(Clone)]
pub struct LearningExtractor {
    generator: Arc<dyn TextGenerator>,
    max_learnings: usize,
    char_limit: usize,
}

impl LearningExtractor {
    pub fn new(generator: Arc<dyn TextGenerator>, max_learnings: usize, char_limit: usize) -> Self {
        Self {
            generator,
            max_learnings: max_learnings.max(1),
            char_limit,
        }
    }

    /// Extract learnings plus up to `num_follow_ups` follow-up questions.
    ///
    /// An empty batch yields empty output without a generation call.
    pub async fn extract(
        &self,
        sub_query: &SubQuery,
        results: &[SearchResult],
        num_follow_ups: usize,
    ) -> Result<Extraction, ResearchError> {
        if results.is_empty() {
            return Ok(Extraction::default());
        }

        let request = prompts::extract_request(
            sub_query,
            results,
            self.max_learnings,
            num_follow_ups,
            self.char_limit,
        );
        let batch: ExtractedBatch = generate_object(self.generator.as_ref(), &request).await?;

        let batch_urls: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
        let mut seen = HashSet::new();
        let learnings: Vec<Learning> = batch
            .learnings
            .into_iter()
            .filter_map(|raw| {
                let (text, sources) = match raw {
                    RawLearning::Cited { text, sources } => (text, sources),
                    RawLearning::Plain(text) => (text, Vec::new()),
                };
                let key = normalize_text(&text);
                if key.is_empty() || !seen.insert(key) {
                    return None;
                }
                Some(Learning::new(text, cited_urls(&sources, &batch_urls)))
            })
            .take(self.max_learnings)
            .collect();

        let follow_up_questions: Vec<String> = batch
            .follow_up_questions
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .take(num_follow_ups)
            .collect();

        debug!(
            query = %sub_query.query,
            results = results.len(),
            learnings = learnings.len(),
            follow_ups = follow_up_questions.len(),
            "Extracted learnings"
        );

        Ok(Extraction {
            learnings,
            follow_up_questions,
        })
    }
}

/// Map 1-based result citations to urls; no valid citation means the whole batch
fn cited_urls<'a>(sources: &[i64], batch_urls: &[&'a str]) -> Vec<&'a str> {
    let cited: Vec<&str> = sources
        .iter()
        .filter_map(|&n| usize::try_from(n).ok())
        .filter_map(|n| n.checked_sub(1))
        .filter_map(|i| batch_urls.get(i).copied())
        .collect();
    if cited.is_empty() {
        batch_urls.to_vec()
    } else {
        cited
    }
}

impl std::fmt::Debug for LearningExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearningExtractor")
            .field("generator", &self.generator.name())
            .field("max_learnings", &self.max_learnings)
            .field("char_limit", &self.char_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::GenerationRequest;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        answer: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for Fixed {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, ResearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.to_string())
        }
        fn name(&self) -> &str {
            "fixed"
        }
        fn model(&self) -> &str {
            "fixed-model"
        }
    }

    fn extractor(answer: &'static str) -> (Arc<Fixed>, LearningExtractor) {
        let generator = Arc::new(Fixed {
            answer,
            calls: AtomicUsize::new(0),
        });
        let extractor = LearningExtractor::new(generator.clone(), 3, 25_000);
        (generator, extractor)
    }

    fn results() -> Vec<SearchResult> {
        vec![
            SearchResult::new("https://a.example", "A", "alpha"),
            SearchResult::new("https://b.example", "B", "beta"),
        ]
    }

    #[tokio::test]
    async fn test_empty_results_skip_generation() {
        let (generator, extractor) = extractor("{}");
        let out = extractor
            .extract(&SubQuery::new("q", "g"), &[], 2)
            .await
            .unwrap();
        assert_eq!(out, Extraction::default());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_citations_map_to_urls() {
        let (_, extractor) = extractor(
            r#"{"learnings": [
                {"text": "Alpha is first.", "sources": [1]},
                {"text": "Beta is second.", "sources": [2, 7, 0, -1]},
                {"text": "Both agree.", "sources": []}
            ], "followUpQuestions": ["What comes third?"]}"#,
        );
        let out = extractor
            .extract(&SubQuery::new("q", "g"), &results(), 2)
            .await
            .unwrap();

        assert_eq!(out.learnings.len(), 3);
        assert_eq!(
            out.learnings[0].source_urls.iter().collect::<Vec<_>>(),
            vec!["https://a.example"]
        );
        assert_eq!(
            out.learnings[1].source_urls.iter().collect::<Vec<_>>(),
            vec!["https://b.example"]
        );
        // no valid citation: attributed to the whole batch
        assert_eq!(out.learnings[2].source_urls.len(), 2);
        assert_eq!(out.follow_up_questions, vec!["What comes third?"]);
    }

    #[tokio::test]
    async fn test_plain_strings_and_verbatim_duplicates() {
        let (_, extractor) = extractor(
            r#"{"learnings": ["Same fact.", "same   FACT.", "Other fact.", "Third.", "Fourth."],
                "followUpQuestions": ["a", " ", "b", "c"]}"#,
        );
        let out = extractor
            .extract(&SubQuery::new("q", "g"), &results(), 2)
            .await
            .unwrap();

        let texts: Vec<_> = out.learnings.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["Same fact.", "Other fact.", "Third."]);
        assert_eq!(out.follow_up_questions, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_malformed_answer_is_parse_error() {
        let (_, extractor) = extractor("I could not find anything useful.");
        let err = extractor
            .extract(&SubQuery::new("q", "g"), &results(), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, ResearchError::Parse(_)));
    }
}
