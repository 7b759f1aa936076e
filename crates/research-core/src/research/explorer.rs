//! Recursive explorer
//!
//! One call of [`RecursiveExplorer::explore`] handles one level of the tree:
//!
//! 1. stop if breadth or depth is exhausted
//! 2. plan `min(breadth, max_fan_out)` sub-queries from the topic and the
//!    learnings gathered so far
//! 3. run every branch concurrently: search, extract, merge, then recurse
//!    with the decayed budget
//! 4. return once every branch (and its subtree) has finished
//!
//! Branches hand their findings to [`ResearchState::merge`] by value. A
//! failed search or extraction contributes nothing and never reaches a
//! sibling; a failed plan truncates only its own subtree.

use futures::future::{join_all, BoxFuture, FutureExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::ResearchError;
use crate::progress::ProgressReporter;
use crate::search::WebSearch;

use super::config::ResearchConfig;
use super::extractor::LearningExtractor;
use super::gate::ApiGate;
use super::planner::QueryPlanner;
use super::prompts;
use super::state::{BranchFindings, Budget, ResearchState, SubQuery};

/// Everything scoped to one run, borrowed by every level
pub struct RunContext<'r> {
    pub state: &'r ResearchState,
    pub reporter: &'r ProgressReporter,
    pub gate: &'r ApiGate,
}

pub struct RecursiveExplorer {
    planner: QueryPlanner,
    extractor: LearningExtractor,
    search: Arc<dyn WebSearch>,
    config: ResearchConfig,
}

impl RecursiveExplorer {
    pub fn new(
        planner: QueryPlanner,
        extractor: LearningExtractor,
        search: Arc<dyn WebSearch>,
        config: ResearchConfig,
    ) -> Self {
        Self {
            planner,
            extractor,
            search,
            config,
        }
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Explore `query` within `budget`, merging into `run.state`
    pub fn explore<'a>(
        &'a self,
        query: String,
        budget: Budget,
        run: &'a RunContext<'a>,
    ) -> BoxFuture<'a, ()> {
        async move {
            if budget.is_exhausted() || run.gate.is_cancelled() {
                return;
            }

            let count = budget.breadth.min(self.config.max_fan_out);
            let level = budget.path.len();
            let prior = run.state.learnings().await;

            let sub_queries = match run
                .gate
                .call(self.planner.plan(&query, &prior, count))
                .await
            {
                Ok(sub_queries) => sub_queries,
                Err(ResearchError::Cancelled) => return,
                Err(e) => {
                    warn!(level, query = %query, error = %e, "Query planning failed, truncating subtree");
                    run.reporter
                        .warning(format!("Could not plan follow-up queries: {}", e))
                        .await;
                    return;
                }
            };

            if sub_queries.is_empty() {
                debug!(level, query = %query, "Planner returned no sub-queries");
                return;
            }

            info!(level, count = sub_queries.len(), breadth = budget.breadth, depth = budget.depth, "Exploring level");
            run.reporter
                .query(format!(
                    "Generated {} search queries: {}",
                    sub_queries.len(),
                    sub_queries
                        .iter()
                        .map(|sq| sq.query.as_str())
                        .collect::<Vec<_>>()
                        .join("; ")
                ))
                .await;

            let child = budget.child(self.config.breadth_decay, &query);
            let branches = sub_queries
                .into_iter()
                .map(|sub_query| self.branch(sub_query, child.clone(), run));
            join_all(branches).await;
        }
        .boxed()
    }

    async fn branch(&self, sub_query: SubQuery, child: Budget, run: &RunContext<'_>) {
        let (findings, follow_ups) = match self.search_and_extract(&sub_query, child.breadth, run).await
        {
            Ok(found) => found,
            Err(ResearchError::Cancelled) => {
                debug!(query = %sub_query.query, "Branch cancelled, findings dropped");
                return;
            }
            Err(e) => {
                warn!(query = %sub_query.query, error = %e, "Branch failed");
                run.reporter
                    .warning(format!("Search for \"{}\" failed: {}", sub_query.query, e))
                    .await;
                return;
            }
        };

        let found = findings.learnings.len();
        let stats = run.state.merge(findings).await;
        debug!(
            query = %sub_query.query,
            new_learnings = stats.new_learnings,
            new_urls = stats.new_urls,
            "Merged branch findings"
        );
        run.reporter
            .research(format!(
                "Found {} learnings for \"{}\" ({} learnings, {} sources so far)",
                found, sub_query.query, stats.total_learnings, stats.total_urls
            ))
            .await;

        if child.is_exhausted() || run.gate.is_cancelled() {
            return;
        }
        let next_query = prompts::follow_up_query(&sub_query.research_goal, &follow_ups);
        run.reporter
            .research(format!(
                "Researching deeper (breadth {}, depth {}): {}",
                child.breadth, child.depth, sub_query.research_goal
            ))
            .await;
        self.explore(next_query, child, run).await;
    }

    /// Search then extract; both succeed or the branch contributes nothing
    async fn search_and_extract(
        &self,
        sub_query: &SubQuery,
        num_follow_ups: usize,
        run: &RunContext<'_>,
    ) -> Result<(BranchFindings, Vec<String>), ResearchError> {
        let results = run
            .gate
            .call(self.search.search(&sub_query.query, self.config.search_result_limit))
            .await?;
        run.reporter
            .research(format!(
                "Searched \"{}\": {} results",
                sub_query.query,
                results.len()
            ))
            .await;

        let extraction = run
            .gate
            .call(self.extractor.extract(sub_query, &results, num_follow_ups))
            .await?;

        let findings = BranchFindings {
            learnings: extraction.learnings,
            urls: results.into_iter().map(|r| r.url).collect(),
        };
        Ok((findings, extraction.follow_up_questions))
    }
}

impl std::fmt::Debug for RecursiveExplorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecursiveExplorer")
            .field("search", &self.search.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
