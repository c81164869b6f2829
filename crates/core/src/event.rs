//! Agent events: the ordered record of what a run is doing, for whoever
//! is watching (a UI, a log shipper, a test).
//!
//! Emission never blocks: the sink is backed by an unbounded mpsc channel,
//! and a sink with no receiver silently drops events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::agent::{StepPhase, TerminationStatus};
use crate::elicitation::{ElicitationAction, InputSchema};

/// Events emitted while a run progresses.
///
/// - `step_started`        : a step began
/// - `reasoning`           : reasoning text was recorded
/// - `tool_selected`       : the loop is about to invoke a tool
/// - `tool_result`         : the invocation finished
/// - `elicitation_request` : a tool needs user input
/// - `elicitation_resolved`: that input arrived (or was cancelled)
/// - `step_completed`      : the step was appended to the log
/// - `final_answer`        : the run ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    StepStarted {
        index: u32,
        phase: StepPhase,
    },

    Reasoning {
        text: String,
    },

    ToolSelected {
        call_id: String,
        name: String,
        arguments: serde_json::Value,
    },

    ToolResult {
        call_id: String,
        success: bool,
        summary: String,
    },

    ElicitationRequest {
        request_id: String,
        server: String,
        prompt: String,
        schema: InputSchema,
    },

    ElicitationResolved {
        request_id: String,
        action: ElicitationAction,
    },

    StepCompleted {
        index: u32,
    },

    FinalAnswer {
        text: String,
        termination_status: TerminationStatus,
    },
}

impl AgentEvent {
    /// Wire name of this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StepStarted { .. } => "step_started",
            Self::Reasoning { .. } => "reasoning",
            Self::ToolSelected { .. } => "tool_selected",
            Self::ToolResult { .. } => "tool_result",
            Self::ElicitationRequest { .. } => "elicitation_request",
            Self::ElicitationResolved { .. } => "elicitation_resolved",
            Self::StepCompleted { .. } => "step_completed",
            Self::FinalAnswer { .. } => "final_answer",
        }
    }
}

/// An event stamped with its session and position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub session_id: String,
    /// Per-sink sequence number, starting at 0
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AgentEvent,
}

struct SinkInner {
    session_id: String,
    sequence: AtomicU64,
    sender: Option<mpsc::UnboundedSender<EventEnvelope>>,
}

/// The sending half. Cheap to clone; clones share one sequence counter.
#[derive(Clone)]
pub struct EventSink {
    inner: Arc<SinkInner>,
}

impl EventSink {
    /// Create a sink and the stream that receives its events.
    pub fn channel(session_id: impl Into<String>) -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            inner: Arc::new(SinkInner {
                session_id: session_id.into(),
                sequence: AtomicU64::new(0),
                sender: Some(tx),
            }),
        };
        (sink, EventStream { receiver: rx })
    }

    /// A sink that discards everything.
    pub fn noop() -> Self {
        Self {
            inner: Arc::new(SinkInner {
                session_id: String::new(),
                sequence: AtomicU64::new(0),
                sender: None,
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Emit one event. Never blocks; a dropped receiver is not an error.
    pub fn emit(&self, event: AgentEvent) {
        let Some(sender) = &self.inner.sender else {
            return;
        };
        let envelope = EventEnvelope {
            session_id: self.inner.session_id.clone(),
            sequence: self.inner.sequence.fetch_add(1, Ordering::SeqCst),
            timestamp: Utc::now(),
            event,
        };
        if sender.send(envelope).is_err() {
            tracing::trace!(session_id = %self.inner.session_id, "event receiver dropped");
        }
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("session_id", &self.inner.session_id)
            .field("connected", &self.inner.sender.is_some())
            .finish()
    }
}

/// The receiving half.
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<EventEnvelope>,
}

impl EventStream {
    /// Wait for the next event; `None` once every sink clone is dropped.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        self.receiver.recv().await
    }

    /// Drain whatever is already buffered without waiting.
    pub fn drain(&mut self) -> Vec<EventEnvelope> {
        let mut events = Vec::new();
        while let Ok(envelope) = self.receiver.try_recv() {
            events.push(envelope);
        }
        events
    }

    /// Adapt into a `Stream` for use with `tokio_stream::StreamExt`.
    pub fn into_stream(self) -> UnboundedReceiverStream<EventEnvelope> {
        UnboundedReceiverStream::new(self.receiver)
    }
}
