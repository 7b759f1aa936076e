//! Research engine: one entry point per request shape
//!
//! [`ResearchEngine::run`] drives a whole run (feedback, exploration,
//! synthesis) and reports it through the progress stream.
//! [`ResearchEngine::feedback`] answers the standalone feedback request.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::ResearchError;
use crate::llm::TextGenerator;
use crate::progress::{EventSink, ProgressReporter, ResearchResult};
use crate::research::{
    ApiGate, FeedbackGenerator, LearningExtractor, QueryPlanner, RecursiveExplorer,
    ReportSynthesizer, ResearchConfig, ResearchRequest, ResearchState, RunContext,
};
use crate::search::WebSearch;

/// Stage a fatal error came from, for the caller-facing message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Research,
    Report,
}

impl Stage {
    /// Interruptions are reported against the run, not the stage they hit
    fn of(error: &ResearchError, stage: Stage) -> Stage {
        if error.is_interruption() {
            Self::Research
        } else {
            stage
        }
    }

    fn message(self, error: &ResearchError) -> String {
        match self {
            Self::Research => format!("Research failed: {}", error),
            Self::Report => format!("Final report generation failed: {}", error),
        }
    }
}

pub struct ResearchEngine {
    explorer: RecursiveExplorer,
    feedback: FeedbackGenerator,
    synthesizer: ReportSynthesizer,
    config: ResearchConfig,
}

impl ResearchEngine {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        search: Arc<dyn WebSearch>,
        config: ResearchConfig,
    ) -> Self {
        let planner = QueryPlanner::new(Arc::clone(&generator));
        let extractor = LearningExtractor::new(
            Arc::clone(&generator),
            config.learnings_per_extraction,
            config.content_char_limit,
        );
        Self {
            explorer: RecursiveExplorer::new(planner, extractor, search, config.clone()),
            feedback: FeedbackGenerator::new(Arc::clone(&generator)),
            synthesizer: ReportSynthesizer::new(generator),
            config,
        }
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Clarifying questions for `query`; failures are returned, never hidden
    pub async fn feedback(
        &self,
        query: &str,
        num_questions: usize,
    ) -> Result<Vec<String>, ResearchError> {
        if query.trim().is_empty() {
            return Err(ResearchError::Config("query must not be empty".to_string()));
        }
        self.feedback.feedback(query, num_questions).await
    }

    /// Execute one research run, writing its events to `sink`.
    ///
    /// The sink always receives exactly one terminal event and is closed
    /// before this returns, unless the request is rejected up front, in which
    /// case it is only closed. Cancelling `cancel` stops the run promptly.
    pub async fn run(
        &self,
        request: ResearchRequest,
        sink: Arc<dyn EventSink>,
        cancel: CancellationToken,
    ) -> Result<ResearchResult, ResearchError> {
        if let Err(e) = request.validate() {
            sink.close().await;
            return Err(e);
        }

        info!(
            query = %request.query,
            breadth = request.breadth,
            depth = request.depth,
            model = request.model.as_deref().unwrap_or("default"),
            "Research run started"
        );

        let reporter =
            ProgressReporter::new(sink).with_terminal_timeout(self.config.event_write_timeout);
        reporter.start("Starting research...").await;

        let token = cancel.child_token();
        let gate = ApiGate::new(self.config.concurrency, token.clone());
        let state = ResearchState::new();
        let timeout = self.config.run_timeout;

        // the token arm also stops a run parked on a full event channel
        let outcome = tokio::select! {
            outcome = self.execute(&request, &state, &reporter, &gate) => outcome,
            _ = token.cancelled() => Err((Stage::Research, ResearchError::Cancelled)),
            _ = tokio::time::sleep(timeout) => {
                token.cancel();
                Err((Stage::Research, ResearchError::Timeout(timeout)))
            }
        };

        match outcome {
            Ok(result) => {
                info!(
                    learnings = result.learnings.len(),
                    sources = result.visited_urls.len(),
                    "Research run completed"
                );
                reporter.complete(result.clone()).await;
                Ok(result)
            }
            Err((stage, e)) => {
                if e.is_interruption() {
                    warn!(error = %e, "Research run interrupted");
                } else {
                    error!(error = %e, ?stage, "Research run failed");
                }
                reporter.fail(stage.message(&e)).await;
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        request: &ResearchRequest,
        state: &ResearchState,
        reporter: &ProgressReporter,
        gate: &ApiGate,
    ) -> Result<ResearchResult, (Stage, ResearchError)> {
        let feedback_questions = if self.config.include_feedback {
            match gate
                .call(self.feedback.feedback(&request.query, self.config.feedback_questions))
                .await
            {
                Ok(questions) => {
                    reporter.query("Generated feedback questions").await;
                    questions
                }
                Err(ResearchError::Cancelled) => {
                    return Err((Stage::Research, ResearchError::Cancelled))
                }
                Err(e) => {
                    warn!(error = %e, "Feedback generation failed, continuing without it");
                    reporter
                        .warning(format!("Feedback generation failed: {}", e))
                        .await;
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let run = RunContext {
            state,
            reporter,
            gate,
        };
        self.explorer
            .explore(request.query.clone(), request.budget(), &run)
            .await;

        if gate.is_cancelled() {
            return Err((Stage::Research, ResearchError::Cancelled));
        }

        let findings = state.snapshot().await;
        reporter
            .research(format!(
                "Research complete: {} learnings from {} sources",
                findings.learnings.len(),
                findings.visited_urls.len()
            ))
            .await;
        reporter.report("Writing final report").await;

        let report = gate
            .call(self.synthesizer.synthesize(
                &request.query,
                findings.learnings.as_slice(),
                findings.visited_urls.as_slice(),
            ))
            .await
            .map_err(|e| (Stage::of(&e, Stage::Report), e))?;
        reporter.report("Final report ready").await;

        Ok(ResearchResult {
            feedback_questions,
            learnings: findings.learnings.into_vec(),
            visited_urls: findings.visited_urls.into_vec(),
            report: report.markdown,
        })
    }
}

impl std::fmt::Debug for ResearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchEngine")
            .field("explorer", &self.explorer)
            .finish_non_exhaustive()
    }
}
