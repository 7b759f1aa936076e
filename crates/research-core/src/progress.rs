//! Progress stream adapter
//!
//! A run talks to its caller through a [`ProgressReporter`], which enforces
//! the event state machine:
//!
//! ```text
//! idle -> started -> progress* -> (result | error) -> closed
//! ```
//!
//! The terminal transition consumes the reporter, so a second `result` or
//! `error` cannot be expressed. Events go to an [`EventSink`]; the HTTP layer
//! uses [`ChannelSink`], tests use [`MemorySink`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::research::Learning;

/// Category of a progress line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Query,
    Research,
    Report,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressStep {
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub content: String,
}

impl ProgressStep {
    pub fn new(kind: StepKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }
}

/// Payload of the `result` event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchResult {
    pub feedback_questions: Vec<String>,
    pub learnings: Vec<Learning>,
    pub visited_urls: Vec<String>,
    /// Final markdown report, sources included
    pub report: String,
}

/// One record of the research event stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResearchEvent {
    Start { message: String },
    Progress { step: ProgressStep },
    #[serde(rename = "result")]
    Completed(ResearchResult),
    Error { message: String },
}

impl ResearchEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Error { .. })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// `data: <json>\n\n`
    pub fn to_sse_frame(&self) -> Result<String, serde_json::Error> {
        Ok(format!("data: {}\n\n", self.to_json()?))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("event stream closed by consumer")]
    Closed,
}

/// Where a run's events are written
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, event: ResearchEvent) -> Result<(), SinkError>;

    /// Release the channel; must be safe to call after a failed send
    async fn close(&self);
}

/// Sink over a bounded tokio channel
#[derive(Debug)]
pub struct ChannelSink {
    tx: Mutex<Option<mpsc::Sender<ResearchEvent>>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ResearchEvent>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    /// New sink plus the receiving end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ResearchEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&self, event: ResearchEvent) -> Result<(), SinkError> {
        // Clone out of the lock so a slow consumer never blocks close()
        let tx = self.tx.lock().await.clone().ok_or(SinkError::Closed)?;
        tx.send(event).await.map_err(|_| SinkError::Closed)
    }

    async fn close(&self) {
        self.tx.lock().await.take();
    }
}

/// Sink that records everything, for tests and the CLI
#[derive(Debug, Default)]
pub struct MemorySink {
    events: std::sync::Mutex<Vec<ResearchEvent>>,
    closed: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ResearchEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn send(&self, event: ResearchEvent) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Started,
}

#[derive(Debug)]
struct ReporterState {
    phase: Phase,
    last_step: Option<ProgressStep>,
    suppressed: usize,
}

/// Default bound on the terminal write, see [`ProgressReporter::with_terminal_timeout`]
pub const TERMINAL_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-run writer of the event stream.
///
/// Shared by reference across the branches of a run. Consecutive identical
/// progress steps are collapsed; ordering within one branch is preserved
/// because each branch awaits its own sends. The state lock is only held to
/// decide what to send, never across a send, so one stalled consumer does
/// not serialize the branches behind it.
pub struct ProgressReporter {
    sink: Arc<dyn EventSink>,
    state: Mutex<ReporterState>,
    terminal_timeout: Duration,
    delivered: AtomicUsize,
    failed: AtomicUsize,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            state: Mutex::new(ReporterState {
                phase: Phase::Idle,
                last_step: None,
                suppressed: 0,
            }),
            terminal_timeout: TERMINAL_WRITE_TIMEOUT,
            delivered: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// How long `complete`/`fail` wait for the consumer before closing anyway
    pub fn with_terminal_timeout(mut self, timeout: Duration) -> Self {
        self.terminal_timeout = timeout;
        self
    }

    /// `idle -> started`; later calls are ignored
    pub async fn start(&self, message: impl Into<String>) {
        // held across the send so no progress line can overtake `start`
        let mut state = self.state.lock().await;
        if state.phase != Phase::Idle {
            return;
        }
        state.phase = Phase::Started;
        let message = message.into();
        self.write(ResearchEvent::Start { message }).await;
    }

    /// Emit a progress step unless it repeats the previous one
    pub async fn progress(&self, step: ProgressStep) {
        {
            let mut state = self.state.lock().await;
            if state.phase == Phase::Idle {
                debug!(content = %step.content, "Progress before start dropped");
                return;
            }
            if state.last_step.as_ref() == Some(&step) {
                state.suppressed += 1;
                return;
            }
            state.last_step = Some(step.clone());
        }
        self.write(ResearchEvent::Progress { step }).await;
    }

    pub async fn query(&self, content: impl Into<String>) {
        self.progress(ProgressStep::new(StepKind::Query, content)).await;
    }

    pub async fn research(&self, content: impl Into<String>) {
        self.progress(ProgressStep::new(StepKind::Research, content)).await;
    }

    pub async fn report(&self, content: impl Into<String>) {
        self.progress(ProgressStep::new(StepKind::Report, content)).await;
    }

    /// Non-fatal problem, shown as a research line
    pub async fn warning(&self, content: impl Into<String>) {
        self.research(format!("Warning: {}", content.into())).await;
    }

    /// Emit `result` and close
    pub async fn complete(self, result: ResearchResult) {
        self.terminate(ResearchEvent::Completed(result)).await;
    }

    /// Emit `error` and close
    pub async fn fail(self, message: impl Into<String>) {
        let message = message.into();
        self.terminate(ResearchEvent::Error { message }).await;
    }

    /// The terminal write is bounded; `close` runs whatever happens to it
    async fn terminate(self, event: ResearchEvent) {
        if tokio::time::timeout(self.terminal_timeout, self.write(event))
            .await
            .is_err()
        {
            warn!(
                timeout_ms = self.terminal_timeout.as_millis() as u64,
                "Consumer stalled, closing without the terminal event"
            );
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.sink.close().await;

        let suppressed = self.state.lock().await.suppressed;
        debug!(
            delivered = self.delivered.load(Ordering::Relaxed),
            suppressed,
            failed = self.failed.load(Ordering::Relaxed),
            "Event stream closed"
        );
    }

    async fn write(&self, event: ResearchEvent) {
        match self.sink.send(event).await {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                if self.failed.fetch_add(1, Ordering::Relaxed) == 0 {
                    warn!(error = %e, "Progress event could not be delivered");
                }
            }
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shapes() {
        let start = ResearchEvent::Start {
            message: "Starting research...".into(),
        };
        assert_eq!(
            serde_json::to_value(&start).unwrap(),
            json!({"type": "start", "message": "Starting research..."})
        );

        let progress = ResearchEvent::Progress {
            step: ProgressStep::new(StepKind::Query, "Generated feedback questions"),
        };
        assert_eq!(
            serde_json::to_value(&progress).unwrap(),
            json!({"type": "progress", "step": {"type": "query", "content": "Generated feedback questions"}})
        );

        let result = ResearchEvent::Completed(ResearchResult {
            feedback_questions: vec!["Which era?".into()],
            learnings: vec![Learning::new("fact", ["https://a.example"])],
            visited_urls: vec!["https://a.example".into()],
            report: "# Report".into(),
        });
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "type": "result",
                "feedbackQuestions": ["Which era?"],
                "learnings": [{"text": "fact", "sourceUrls": ["https://a.example"]}],
                "visitedUrls": ["https://a.example"],
                "report": "# Report"
            })
        );

        let error = ResearchEvent::Error {
            message: "Research failed: boom".into(),
        };
        assert_eq!(
            error.to_sse_frame().unwrap(),
            "data: {\"type\":\"error\",\"message\":\"Research failed: boom\"}\n\n"
        );
        assert!(error.is_terminal() && result.is_terminal());
        assert!(!start.is_terminal() && !progress.is_terminal());
    }

    #[tokio::test]
    async fn test_consecutive_duplicates_suppressed() {
        let sink = Arc::new(MemorySink::new());
        let reporter = ProgressReporter::new(sink.clone());
        reporter.start("go").await;
        reporter.research("searching").await;
        reporter.research("searching").await;
        reporter.query("searching").await;
        reporter.research("searching").await;
        reporter.complete(ResearchResult::default()).await;

        let events = sink.events();
        // start, research, query, research, result
        assert_eq!(events.len(), 5);
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn test_start_once_and_progress_requires_start() {
        let sink = Arc::new(MemorySink::new());
        let reporter = ProgressReporter::new(sink.clone());
        reporter.research("too early").await;
        reporter.start("one").await;
        reporter.start("two").await;
        reporter.fail("nope").await;

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ResearchEvent::Start { message } if message == "one"));
        assert!(events[1].is_terminal());
    }

    #[tokio::test]
    async fn test_channel_closes_after_terminal() {
        let (sink, mut rx) = ChannelSink::channel(8);
        let reporter = ProgressReporter::new(Arc::new(sink));
        reporter.start("go").await;
        reporter.fail("boom").await;

        assert!(matches!(rx.recv().await, Some(ResearchEvent::Start { .. })));
        assert!(matches!(rx.recv().await, Some(ResearchEvent::Error { .. })));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_dropped_consumer_still_closes() {
        let (sink, rx) = ChannelSink::channel(1);
        drop(rx);
        let sink = Arc::new(sink);
        let reporter = ProgressReporter::new(sink.clone());
        reporter.start("go").await;
        reporter.complete(ResearchResult::default()).await;
        assert_eq!(
            sink.send(ResearchEvent::Start { message: "x".into() }).await,
            Err(SinkError::Closed)
        );
    }

    #[tokio::test]
    async fn test_stalled_consumer_still_closes() {
        let (sink, mut rx) = ChannelSink::channel(1);
        let reporter = ProgressReporter::new(Arc::new(sink))
            .with_terminal_timeout(Duration::from_millis(50));
        reporter.start("go").await;

        // buffer is full and nobody reads: the terminal write gives up
        let closed = tokio::time::timeout(Duration::from_secs(2), reporter.fail("deadline")).await;
        assert!(closed.is_ok());

        assert!(matches!(rx.recv().await, Some(ResearchEvent::Start { .. })));
        assert_eq!(rx.recv().await, None);
    }
}
