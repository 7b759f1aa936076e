//! Query planner: one level's sub-queries

use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::error::ResearchError;
use crate::llm::{generate_object, TextGenerator};

use super::prompts;
use super::state::{Learning, SubQuery};

#[derive(Debug, Deserialize)]
struct PlannedQueries {
    queries: Vec<PlannedQuery>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlannedQuery {
    query: String,
    #[serde(default)]
    research_goal: String,
}

/// Turns a topic (plus what is already known) into distinct sub-queries
#[derive(Clone)]
pub struct QueryPlanner {
    generator: Arc<dyn TextGenerator>,
}

impl QueryPlanner {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// At most `count` sub-queries with pairwise distinct normalized text.
    ///
    /// Fewer than `count` is not an error. Generation failures propagate.
    pub async fn plan(
        &self,
        topic: &str,
        prior: &[Learning],
        count: usize,
    ) -> Result<Vec<SubQuery>, ResearchError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let request = prompts::plan_request(topic, prior, count);
        let planned: PlannedQueries = generate_object(self.generator.as_ref(), &request).await?;
        let returned = planned.queries.len();

        let mut seen = HashSet::new();
        let queries: Vec<SubQuery> = planned
            .queries
            .into_iter()
            .filter_map(|p| {
                let query = p.query.trim().to_string();
                if query.is_empty() {
                    return None;
                }
                let goal = match p.research_goal.trim() {
                    "" => query.clone(),
                    goal => goal.to_string(),
                };
                Some(SubQuery::new(query, goal))
            })
            .filter(|sq| seen.insert(sq.key()))
            .take(count)
            .collect();

        debug!(
            topic = %topic,
            requested = count,
            returned,
            kept = queries.len(),
            "Planned sub-queries"
        );
        Ok(queries)
    }
}

impl std::fmt::Debug for QueryPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPlanner")
            .field("generator", &self.generator.name())
            .finish()
    }
}
