//! # HTTP Server
//!
//! - `POST /api/feedback`: clarifying questions as JSON
//! - `POST /api/research`: one research run as a server-sent event stream
//! - `GET /health`
//!
//! A research run executes in its own task writing into an mpsc channel; the
//! response body is a stream over the receiving end. When the client goes
//! away the receiver is dropped, which cancels the run.

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use research_core::{ChannelSink, ResearchRequest};

use crate::agent::ResearchAgent;

/// Events buffered between a run and a slow client
const EVENT_BUFFER: usize = 64;

/// Questions asked when a feedback request does not say
const DEFAULT_FEEDBACK_QUESTIONS: usize = 3;

// =============================================================================
// STATE AND ERRORS
// =============================================================================
#[derive(Clone)]
pub struct AppState {
    agent: Arc<ResearchAgent>,
}

impl AppState {
    pub fn new(agent: ResearchAgent) -> Self {
        Self {
            agent: Arc::new(agent),
        }
    }
}

/// Request rejections, rendered as `{error, details?}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API keys are required but not provided in environment variables")]
    MissingCredentials,

    #[error("{0}")]
    BadRequest(String),

    #[error("Feedback generation failed")]
    Feedback(String),

    #[error("Research failed: {0}")]
    Research(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::MissingCredentials => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Feedback(_) | Self::Research(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = match &self {
            Self::Feedback(details) => json!({ "error": self.to_string(), "details": details }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

// =============================================================================
// ROUTES
// =============================================================================
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/feedback", post(feedback))
        .route("/api/research", post(research))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until ctrl-c
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "Research server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("Server error")
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedbackBody {
    query: String,
    num_questions: Option<usize>,
    model_id: Option<String>,
}

async fn feedback(
    State(state): State<AppState>,
    payload: Result<Json<FeedbackBody>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.agent.config().credentials_satisfied() {
        return Err(ApiError::MissingCredentials);
    }
    let Json(body) = payload?;
    if body.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }

    let num_questions = body.num_questions.unwrap_or(DEFAULT_FEEDBACK_QUESTIONS);
    info!(query = %body.query, num_questions, "Feedback requested");

    let questions = state
        .agent
        .feedback(&body.query, num_questions, body.model_id.as_deref())
        .await
        .map_err(|e| {
            error!(error = %e, "Feedback generation failed");
            ApiError::Feedback(e.to_string())
        })?;

    Ok(Json(json!({ "questions": questions })))
}

async fn research(
    State(state): State<AppState>,
    payload: Result<Json<ResearchRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    if !state.agent.config().credentials_satisfied() {
        return Err(ApiError::MissingCredentials);
    }
    let Json(request) = payload?;
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let engine = state
        .agent
        .engine(request.model.as_deref())
        .map_err(|e| ApiError::Research(e.to_string()))?;

    info!(
        query = %request.query,
        breadth = request.breadth,
        depth = request.depth,
        model = %state.agent.model_for(request.model.as_deref()),
        "Research requested"
    );

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    // Held only to notice the client leaving; dropped when the run ends
    let watcher = tx.clone();
    let sink = Arc::new(ChannelSink::new(tx));
    let cancel = CancellationToken::new();

    tokio::spawn(async move {
        let run = engine.run(request, sink, cancel.clone());
        tokio::pin!(run);
        tokio::select! {
            _ = &mut run => {}
            _ = watcher.closed() => {
                warn!("Client disconnected, cancelling research run");
                cancel.cancel();
                let _ = run.await;
            }
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| Event::default().json_data(event));
    Ok(Sse::new(stream).into_response())
}
