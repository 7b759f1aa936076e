//! Research orchestration
//!
//! - [`state`]: request, learnings, visited urls and the run aggregator
//! - [`planner`], [`extractor`], [`feedback`], [`report`]: the generation-backed steps
//! - [`explorer`]: breadth/depth recursion over those steps
//! - [`gate`]: global ceiling on concurrent external calls
//! - [`prompts`]: prompt templates and output schemas

pub mod config;
pub mod explorer;
pub mod extractor;
pub mod feedback;
pub mod gate;
pub mod planner;
pub mod prompts;
pub mod report;
pub mod schedule;
pub mod state;

pub use config::ResearchConfig;
pub use explorer::{RecursiveExplorer, RunContext};
pub use extractor::{Extraction, LearningExtractor};
pub use feedback::FeedbackGenerator;
pub use gate::ApiGate;
pub use planner::QueryPlanner;
pub use report::ReportSynthesizer;
pub use schedule::BreadthDecay;
pub use state::{
    normalize_text, BranchFindings, Budget, Findings, Learning, LearningSet, MergeStats,
    ResearchReport, ResearchRequest, ResearchState, SubQuery, VisitedUrls, DEFAULT_BREADTH,
    DEFAULT_DEPTH, MAX_DEPTH,
};
