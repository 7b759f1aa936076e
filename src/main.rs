//! # Deep Research
//!
//! Recursive web research from the command line or over HTTP.
//!
//! A question is expanded into sub-queries, each sub-query is searched and
//! distilled into learnings, promising threads are followed deeper, and the
//! whole set of learnings is synthesized into a cited markdown report.
//!
//! ## Quick Start
//! ```bash
//! cargo run -- research "What is the impact of X on Y?" --breadth 2 --depth 1
//! cargo run -- serve --bind 127.0.0.1:3000
//! ```

// =============================================================================
// MODULE DECLARATIONS
// =============================================================================

/// Configuration management
mod config;

/// Provider wiring for the research engine
mod agent;

/// HTTP front door
mod server;

// =============================================================================
// IMPORTS
// =============================================================================
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use research_core::{
    CancellationToken, ChannelSink, ResearchEvent, ResearchRequest, DEFAULT_BREADTH,
    DEFAULT_DEPTH,
};

use crate::agent::ResearchAgent;
use crate::config::Config;
use crate::server::AppState;

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
#[derive(Parser, Debug)]
#[command(
    name = "deep-research",
    version,
    about = "Recursive deep-research agent with streamed progress and cited reports",
    long_about = r#"
Deep Research - breadth/depth web research with cited reports.

It will:
  1. Ask a few clarifying questions about your query
  2. Plan search queries and search the web for each
  3. Extract learnings and follow promising threads deeper
  4. Write a final markdown report citing every visited source

PREREQUISITES:
  OPENAI_API_KEY and TAVILY_API_KEY in the environment or a .env file

EXAMPLES:
  # Research with the default budget (breadth 3, depth 2)
  deep-research research "What are the latest developments in Rust async?"

  # Smaller budget, raw event stream
  deep-research research --breadth 2 --depth 1 --events "Rust web frameworks"

  # Serve the HTTP API
  deep-research serve --bind 0.0.0.0:3000
"#
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long = "verbose", global = true, default_value = "false")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one research request and print the report
    Research {
        /// The research topic or question to investigate
        #[arg(value_name = "QUERY")]
        query: String,

        /// Sub-queries explored at the top level
        #[arg(short = 'b', long = "breadth", default_value_t = DEFAULT_BREADTH)]
        breadth: usize,

        /// Recursive levels
        #[arg(short = 'd', long = "depth", default_value_t = DEFAULT_DEPTH)]
        depth: usize,

        /// Model to use (overrides DEFAULT_MODEL)
        #[arg(short = 'm', long = "model")]
        model: Option<String>,

        /// Skip the clarifying-questions step
        #[arg(long = "no-feedback", default_value = "false")]
        no_feedback: bool,

        /// Print raw `data: {...}` frames instead of the rendered report
        #[arg(long = "events", default_value = "false")]
        events: bool,
    },

    /// Ask the model for clarifying questions about a query
    Feedback {
        #[arg(value_name = "QUERY")]
        query: String,

        /// Maximum number of questions
        #[arg(short = 'n', long = "questions", default_value_t = 3)]
        questions: usize,

        /// Model to use (overrides DEFAULT_MODEL)
        #[arg(short = 'm', long = "model")]
        model: Option<String>,
    },

    /// Serve the feedback and research endpoints over HTTP
    Serve {
        /// Address to bind (overrides BIND_ADDR)
        #[arg(long = "bind")]
        bind: Option<SocketAddr>,
    },
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose)?;

    let config = Config::from_env()?;
    config.validate()?;

    info!(
        model = %config.default_model,
        concurrency = config.concurrency,
        decay = %config.breadth_decay,
        "Configuration loaded"
    );

    match args.command {
        Command::Research {
            query,
            breadth,
            depth,
            model,
            no_feedback,
            events,
        } => {
            let mut request = ResearchRequest::new(query)
                .with_breadth(breadth)
                .with_depth(depth);
            if let Some(model) = model {
                request = request.with_model(model);
            }
            run_research(config, request, !no_feedback, events).await
        }
        Command::Feedback {
            query,
            questions,
            model,
        } => {
            let agent = ResearchAgent::new(config);
            let questions = agent.feedback(&query, questions, model.as_deref()).await?;
            if questions.is_empty() {
                println!("No clarifying questions needed.");
            }
            for (i, question) in questions.iter().enumerate() {
                println!("{}. {}", i + 1, question);
            }
            Ok(())
        }
        Command::Serve { bind } => {
            let addr = bind.unwrap_or(config.bind_addr);
            server::serve(AppState::new(ResearchAgent::new(config)), addr).await
        }
    }
}

/// Run one request, printing progress as it streams in
async fn run_research(
    config: Config,
    request: ResearchRequest,
    include_feedback: bool,
    raw_events: bool,
) -> Result<()> {
    let agent = ResearchAgent::new(config);
    let settings = agent
        .config()
        .research_config()
        .with_feedback(include_feedback);
    let engine = agent.engine_with(request.model.as_deref(), settings)?;

    let (sink, mut rx) = ChannelSink::channel(64);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if raw_events {
                match event.to_sse_frame() {
                    Ok(frame) => print!("{}", frame),
                    Err(e) => error!(error = %e, "Could not encode event"),
                }
                continue;
            }
            match event {
                ResearchEvent::Start { message } => eprintln!("{}", message),
                ResearchEvent::Progress { step } => eprintln!("  [{:?}] {}", step.kind, step.content),
                ResearchEvent::Completed(_) | ResearchEvent::Error { .. } => {}
            }
        }
    });

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let outcome = engine.run(request, Arc::new(sink), cancel).await;
    ctrl_c.abort();
    let _ = printer.await;

    let result = outcome?;
    if !raw_events {
        if !result.feedback_questions.is_empty() {
            println!("\nClarifying questions to consider:");
            for question in &result.feedback_questions {
                println!("  - {}", question);
            }
        }
        println!("\n{}", "=".repeat(60));
        println!("RESEARCH REPORT");
        println!("{}\n", "=".repeat(60));
        println!("{}", result.report);
        println!("\n{}", "=".repeat(60));
        info!(
            learnings = result.learnings.len(),
            sources = result.visited_urls.len(),
            "Research completed successfully"
        );
    }
    Ok(())
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
/// Initialize the tracing subscriber for structured logging.
///
/// `RUST_LOG` wins when set; otherwise INFO, or DEBUG with `--verbose`.
fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
