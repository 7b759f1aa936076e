//! Report synthesizer

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ResearchError;
use crate::llm::{generate_object, TextGenerator};

use super::prompts;
use super::state::{Learning, ResearchReport};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportBody {
    report_markdown: String,
}

/// Writes the final markdown report and its source list
#[derive(Clone)]
pub struct ReportSynthesizer {
    generator: Arc<dyn TextGenerator>,
}

impl ReportSynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Every learning goes into the prompt; every visited url is cited.
    ///
    /// With no learnings a fixed "no findings" report is returned without
    /// calling the generator.
    pub async fn synthesize(
        &self,
        query: &str,
        learnings: &[Learning],
        visited_urls: &[String],
    ) -> Result<ResearchReport, ResearchError> {
        let body = if learnings.is_empty() {
            info!(query = %query, "No learnings gathered, writing empty report");
            format!("# Research Report\n\n{}", prompts::NO_FINDINGS_REPORT)
        } else {
            let request = prompts::report_request(query, learnings);
            let report: ReportBody = generate_object(self.generator.as_ref(), &request).await?;
            debug!(
                learnings = learnings.len(),
                chars = report.report_markdown.len(),
                "Report generated"
            );
            report.report_markdown.trim_end().to_string()
        };

        Ok(ResearchReport {
            markdown: format!("{}{}", body, render_sources(visited_urls)),
            cited_urls: visited_urls.to_vec(),
        })
    }
}

fn render_sources(urls: &[String]) -> String {
    if urls.is_empty() {
        return String::new();
    }
    let bullets = urls
        .iter()
        .map(|url| format!("- {}", url))
        .collect::<Vec<_>>()
        .join("\n");
    format!("\n\n## Sources\n\n{}", bullets)
}

impl std::fmt::Debug for ReportSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportSynthesizer")
            .field("generator", &self.generator.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::GenerationRequest;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl TextGenerator for Recorder {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, ResearchError> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            if self.fail {
                return Err(ResearchError::Llm("context length exceeded".into()));
            }
            Ok(r###"{"reportMarkdown": "# Findings\n\nAll good.\n"}"###.to_string())
        }
        fn name(&self) -> &str {
            "recorder"
        }
        fn model(&self) -> &str {
            "recorder-model"
        }
    }

    #[tokio::test]
    async fn test_empty_learnings_report() {
        let generator = Arc::new(Recorder::default());
        let synthesizer = ReportSynthesizer::new(generator.clone());
        let report = synthesizer
            .synthesize("q", &[], &["https://a.example".to_string()])
            .await
            .unwrap();

        assert!(report.markdown.contains("No findings were gathered"));
        assert!(report.markdown.ends_with("## Sources\n\n- https://a.example"));
        assert!(generator.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_report_appends_sources() {
        let generator = Arc::new(Recorder::default());
        let synthesizer = ReportSynthesizer::new(generator.clone());
        let learnings = vec![
            Learning::new("first fact", ["https://a.example"]),
            Learning::new("second fact", ["https://b.example"]),
        ];
        let urls = vec!["https://a.example".to_string(), "https://b.example".to_string()];
        let report = synthesizer.synthesize("q", &learnings, &urls).await.unwrap();

        assert_eq!(
            report.markdown,
            "# Findings\n\nAll good.\n\n## Sources\n\n- https://a.example\n- https://b.example"
        );
        assert_eq!(report.cited_urls, urls);

        let prompt = &generator.prompts.lock().unwrap()[0];
        assert!(prompt.contains("first fact") && prompt.contains("second fact"));
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let generator = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let synthesizer = ReportSynthesizer::new(generator);
        let learnings = vec![Learning::new("fact", Vec::<String>::new())];
        assert!(synthesizer.synthesize("q", &learnings, &[]).await.is_err());
    }
}
