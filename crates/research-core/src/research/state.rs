//! Research run state
//!
//! - [`ResearchRequest`]: the immutable exploration budget of one run
//! - [`Learning`], [`LearningSet`], [`VisitedUrls`]: append-and-deduplicate sets
//! - [`Budget`]: remaining breadth/depth and the query path of one call
//! - [`ResearchState`]: the run-scoped aggregator every branch merges into

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tokio::sync::Mutex;

use crate::error::ResearchError;
use crate::search::normalize_url;

use super::schedule::BreadthDecay;

/// Default fan-out width of the top level
pub const DEFAULT_BREADTH: usize = 3;

/// Default number of recursive levels
pub const DEFAULT_DEPTH: usize = 2;

/// Deepest recursion a request may ask for; each level nests one more future
pub const MAX_DEPTH: usize = 10;

/// Case- and whitespace-insensitive form used for text identity
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// One research run's parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub query: String,
    #[serde(default = "default_breadth")]
    pub breadth: usize,
    #[serde(default = "default_depth")]
    pub depth: usize,
    /// Model override; the server default applies when absent
    #[serde(default, rename = "modelId", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

fn default_breadth() -> usize {
    DEFAULT_BREADTH
}

fn default_depth() -> usize {
    DEFAULT_DEPTH
}

impl ResearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            breadth: DEFAULT_BREADTH,
            depth: DEFAULT_DEPTH,
            model: None,
        }
    }

    pub fn with_breadth(mut self, breadth: usize) -> Self {
        self.breadth = breadth;
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Reject requests that cannot start a run
    pub fn validate(&self) -> Result<(), ResearchError> {
        if self.query.trim().is_empty() {
            return Err(ResearchError::Config("query must not be empty".to_string()));
        }
        if self.breadth == 0 {
            return Err(ResearchError::Config("breadth must be at least 1".to_string()));
        }
        if self.depth > MAX_DEPTH {
            return Err(ResearchError::Config(format!(
                "depth must be at most {}, got {}",
                MAX_DEPTH, self.depth
            )));
        }
        Ok(())
    }

    /// Budget of the top-level `explore` call
    pub fn budget(&self) -> Budget {
        Budget::new(self.breadth, self.depth)
    }
}

/// A planned sub-query, consumed within one recursion level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuery {
    /// Search engine query
    pub query: String,
    /// What this query should uncover; seeds the next level
    pub research_goal: String,
}

impl SubQuery {
    pub fn new(query: impl Into<String>, research_goal: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            research_goal: research_goal.into(),
        }
    }

    pub fn key(&self) -> String {
        normalize_text(&self.query)
    }
}

/// An atomic, self-contained finding with provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Learning {
    pub text: String,
    #[serde(default)]
    pub source_urls: BTreeSet<String>,
}

impl Learning {
    pub fn new<I, S>(text: impl Into<String>, source_urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            text: text.into().trim().to_string(),
            source_urls: source_urls.into_iter().map(Into::into).collect(),
        }
    }

    pub fn key(&self) -> String {
        normalize_text(&self.text)
    }
}

/// Insertion-ordered set of learnings keyed by normalized text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LearningSet {
    items: Vec<Learning>,
    keys: HashSet<String>,
}

impl LearningSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless an equal learning is already present.
    ///
    /// Returns whether the set grew. An existing entry is left untouched,
    /// including its sources.
    pub fn insert(&mut self, learning: Learning) -> bool {
        let key = learning.key();
        if key.is_empty() || !self.keys.insert(key) {
            return false;
        }
        self.items.push(learning);
        true
    }

    /// Insert all, returning how many were new
    pub fn extend(&mut self, learnings: impl IntoIterator<Item = Learning>) -> usize {
        learnings
            .into_iter()
            .map(|learning| self.insert(learning))
            .filter(|added| *added)
            .count()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.keys.contains(&normalize_text(text))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Learning> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Learning] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<Learning> {
        self.items
    }
}

impl FromIterator<Learning> for LearningSet {
    fn from_iter<T: IntoIterator<Item = Learning>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

/// Insertion-ordered set of urls keyed by [`normalize_url`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisitedUrls {
    urls: Vec<String>,
    keys: HashSet<String>,
}

impl VisitedUrls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping the first spelling seen; returns whether the set grew
    pub fn insert(&mut self, url: impl Into<String>) -> bool {
        let url = url.into();
        let key = normalize_url(&url);
        if key.is_empty() || !self.keys.insert(key) {
            return false;
        }
        self.urls.push(url.trim().to_string());
        true
    }

    pub fn extend<I, S>(&mut self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        urls.into_iter()
            .map(|url| self.insert(url))
            .filter(|added| *added)
            .count()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.keys.contains(&normalize_url(url))
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.urls.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.urls
    }

    pub fn into_vec(self) -> Vec<String> {
        self.urls
    }
}

/// Remaining exploration budget of one `explore` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Budget {
    pub breadth: usize,
    pub depth: usize,
    /// Queries from the root down to this call
    pub path: Vec<String>,
}

impl Budget {
    pub fn new(breadth: usize, depth: usize) -> Self {
        Self {
            breadth,
            depth,
            path: Vec::new(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.breadth == 0 || self.depth == 0
    }

    /// Budget handed to the children of this level
    pub fn child(&self, decay: BreadthDecay, via: &str) -> Self {
        let mut path = self.path.clone();
        path.push(via.to_string());
        Self {
            breadth: decay.next_breadth(self.breadth),
            depth: self.depth.saturating_sub(1),
            path,
        }
    }
}

/// What one branch found, returned by value to the merge step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BranchFindings {
    pub learnings: Vec<Learning>,
    pub urls: Vec<String>,
}

/// Counters reported by one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub new_learnings: usize,
    pub new_urls: usize,
    pub total_learnings: usize,
    pub total_urls: usize,
}

/// Accumulated learnings and visited urls of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Findings {
    pub learnings: LearningSet,
    pub visited_urls: VisitedUrls,
}

impl Findings {
    /// Set-union merge; commutative and idempotent
    pub fn merge(&mut self, branch: BranchFindings) -> MergeStats {
        let new_urls = self.visited_urls.extend(branch.urls);
        let new_learnings = self.learnings.extend(branch.learnings);
        MergeStats {
            new_learnings,
            new_urls,
            total_learnings: self.learnings.len(),
            total_urls: self.visited_urls.len(),
        }
    }
}

/// The single writer of a run's [`Findings`].
///
/// Branches never touch the sets directly: they hand their [`BranchFindings`]
/// to [`ResearchState::merge`], which applies the union under a lock. One
/// instance exists per run and is dropped when the run ends.
#[derive(Debug, Default)]
pub struct ResearchState {
    findings: Mutex<Findings>,
}

impl ResearchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn merge(&self, branch: BranchFindings) -> MergeStats {
        self.findings.lock().await.merge(branch)
    }

    /// Snapshot of the learnings gathered so far
    pub async fn learnings(&self) -> Vec<Learning> {
        self.findings.lock().await.learnings.as_slice().to_vec()
    }

    pub async fn snapshot(&self) -> Findings {
        self.findings.lock().await.clone()
    }

    pub fn into_findings(self) -> Findings {
        self.findings.into_inner()
    }
}

/// Final artifact of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchReport {
    pub markdown: String,
    pub cited_urls: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Rust   IS\tfast \n"), "rust is fast");
    }

    #[test]
    fn test_request_defaults_from_json() {
        let request: ResearchRequest =
            serde_json::from_str(r#"{"query": "impact of X on Y"}"#).unwrap();
        assert_eq!(request.breadth, 3);
        assert_eq!(request.depth, 2);
        assert_eq!(request.model, None);

        let request: ResearchRequest =
            serde_json::from_str(r#"{"query": "q", "breadth": 2, "depth": 1, "modelId": "gpt-4o"}"#)
                .unwrap();
        assert_eq!(request.breadth, 2);
        assert_eq!(request.model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn test_request_validation() {
        assert!(ResearchRequest::new("q").validate().is_ok());
        assert!(ResearchRequest::new("   ").validate().is_err());
        assert!(ResearchRequest::new("q").with_breadth(0).validate().is_err());
        // depth 0 is a valid, empty exploration
        assert!(ResearchRequest::new("q").with_depth(0).validate().is_ok());
        assert!(ResearchRequest::new("q").with_depth(MAX_DEPTH).validate().is_ok());
        assert!(ResearchRequest::new("q")
            .with_breadth(1)
            .with_depth(1_000_000)
            .validate()
            .is_err());
    }

    #[test]
    fn test_learning_set_dedup_is_idempotent() {
        let mut set = LearningSet::new();
        assert!(set.insert(Learning::new("Rust 1.0 shipped in May 2015.", ["https://a.example"])));
        let before = set.clone();

        assert!(!set.insert(Learning::new("  rust 1.0 SHIPPED in may   2015. ", ["https://b.example"])));
        assert_eq!(set, before);
        assert_eq!(set.len(), 1);
        assert!(set.as_slice()[0].source_urls.contains("https://a.example"));
    }

    #[test]
    fn test_learning_set_rejects_empty() {
        let mut set = LearningSet::new();
        assert!(!set.insert(Learning::new("   ", Vec::<String>::new())));
        assert!(set.is_empty());
    }

    #[test]
    fn test_visited_urls_dedup() {
        let mut urls = VisitedUrls::new();
        assert!(urls.insert("https://Example.com/page/"));
        assert!(!urls.insert("https://example.com/page#intro"));
        assert!(urls.insert("https://example.com/other"));
        assert_eq!(urls.len(), 2);
        assert_eq!(urls.as_slice()[0], "https://Example.com/page/");
    }

    #[test]
    fn test_budget_child_halving() {
        let budget = Budget::new(4, 2);
        let child = budget.child(BreadthDecay::Halving, "sub query");
        assert_eq!(child.breadth, 2);
        assert_eq!(child.depth, 1);
        assert_eq!(child.path, vec!["sub query".to_string()]);

        let grandchild = child.child(BreadthDecay::Halving, "deeper");
        assert_eq!(grandchild.breadth, 1);
        assert!(grandchild.is_exhausted());
    }

    #[test]
    fn test_findings_merge_commutative() {
        let a = BranchFindings {
            learnings: vec![Learning::new("fact one", ["https://a.example"])],
            urls: vec!["https://a.example".into()],
        };
        let b = BranchFindings {
            learnings: vec![
                Learning::new("fact two", ["https://b.example"]),
                Learning::new("Fact One", ["https://b.example"]),
            ],
            urls: vec!["https://b.example".into(), "https://a.example/".into()],
        };

        let mut ab = Findings::default();
        ab.merge(a.clone());
        ab.merge(b.clone());

        let mut ba = Findings::default();
        ba.merge(b);
        ba.merge(a);

        assert_eq!(ab.learnings.len(), ba.learnings.len());
        assert_eq!(ab.visited_urls.len(), ba.visited_urls.len());
        assert_eq!(ab.learnings.len(), 2);
        assert_eq!(ab.visited_urls.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_merges_lose_nothing() {
        let state = Arc::new(ResearchState::new());
        let mut handles = Vec::new();

        for i in 0..32 {
            let state = Arc::clone(&state);
            handles.push(tokio::spawn(async move {
                state
                    .merge(BranchFindings {
                        learnings: vec![Learning::new(format!("fact {}", i), [format!("https://x.example/{}", i)])],
                        urls: vec![format!("https://x.example/{}", i)],
                    })
                    .await
            }));
        }

        let mut totals = Vec::new();
        for handle in handles {
            totals.push(handle.await.unwrap().total_learnings);
        }

        let findings = Arc::try_unwrap(state).unwrap().into_findings();
        assert_eq!(findings.learnings.len(), 32);
        assert_eq!(findings.visited_urls.len(), 32);
        // every merge observed a distinct, growing total
        totals.sort_unstable();
        assert_eq!(totals, (1..=32).collect::<Vec<_>>());
    }

    #[test]
    fn test_learning_serialization_shape() {
        let learning = Learning::new("fact", ["https://a.example"]);
        let json = serde_json::to_value(&learning).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"text": "fact", "sourceUrls": ["https://a.example"]})
        );
    }
}
