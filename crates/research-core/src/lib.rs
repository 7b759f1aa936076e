//! research-core: recursive deep-research engine
//!
//! Turns one research question into a cited markdown report by recursively
//! planning sub-queries, searching the web, extracting learnings and
//! synthesizing the result, while streaming progress to the caller.
//!
//! # Usage
//!
//! ```rust,ignore
//! use rig::client::{CompletionClient, ProviderClient};
//! use rig::providers::openai::Client;
//! use research_core::{
//!     ChannelSink, ResearchConfig, ResearchEngine, ResearchRequest, RigGenerator, TavilySearch,
//! };
//!
//! let agent = Client::from_env().agent("o3-mini").build();
//! let generator = Arc::new(RigGenerator::new(agent));
//! let search = Arc::new(TavilySearch::from_env()?);
//! let engine = ResearchEngine::new(generator, search, ResearchConfig::default());
//!
//! let (sink, mut events) = ChannelSink::channel(64);
//! let request = ResearchRequest::new("impact of X on Y").with_breadth(2).with_depth(1);
//! engine.run(request, Arc::new(sink), CancellationToken::new()).await?;
//! ```

pub mod compat;
pub mod engine;
pub mod error;
pub mod llm;
pub mod progress;
pub mod research;
pub mod search;

pub use compat::RigGenerator;
pub use engine::ResearchEngine;
pub use error::ResearchError;
pub use llm::{generate_object, parse_json_response, GenerationRequest, LLMConfig, TextGenerator};
pub use progress::{
    ChannelSink, EventSink, MemorySink, ProgressReporter, ProgressStep, ResearchEvent,
    ResearchResult, SinkError, StepKind,
};
pub use research::{
    BreadthDecay, Learning, ResearchConfig, ResearchReport, ResearchRequest, SubQuery,
    DEFAULT_BREADTH, DEFAULT_DEPTH, MAX_DEPTH,
};
pub use search::{
    normalize_url, RetryPolicy, SearchDepth, SearchResult, TavilyError, TavilySearch, Topic, WebSearch,
};

// Re-export so callers can cancel runs without a direct dependency
pub use tokio_util::sync::CancellationToken;
