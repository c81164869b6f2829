//! Model capability: the abstraction over whatever produces the next step.
//!
//! The loop never talks to a provider API directly. It hands the accumulated
//! conversation and the tool schemas it is willing to expose to a
//! [`ModelCapability`] and gets back a [`ModelStep`]: free text, an optional
//! structured action, and an optional completion flag.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::message::Message;
use crate::tool::ToolCall;

/// What the loop expects from this particular model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    /// Reasoning only; no tools are offered and any action is ignored.
    Reason,
    /// Exactly one tool call or a final answer.
    Act,
    /// Reasoning plus an action or final answer in the same reply.
    ReasonAndAct,
    /// The step budget is spent; answer from the transcript alone.
    FinalAnswer,
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Namespaced tool name (`{server}_{tool}`)
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Whether the parameter schema declares a top-level property.
    pub fn declares(&self, property: &str) -> bool {
        self.parameters
            .get("properties")
            .and_then(|p| p.get(property))
            .is_some()
    }
}

/// One request to the model capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// The conversation messages, including any transient directives
    pub messages: Vec<Message>,

    /// Tools the model may select in this call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// What kind of answer the loop expects
    pub mode: RequestMode,
}

/// What the model returned for one step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelStep {
    /// Free text (reasoning, prose, or an embedded action description)
    #[serde(default)]
    pub text: String,

    /// Structured action, when the backend supports native tool calling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ToolCall>,

    /// Explicit completion flag, when the backend reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished: Option<bool>,
}

impl ModelStep {
    /// A plain text step with no action and no completion flag.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: None,
            finished: None,
        }
    }

    /// A text step explicitly flagged as the final answer.
    pub fn finished(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: None,
            finished: Some(true),
        }
    }

    /// A step carrying a native structured action.
    pub fn with_action(text: impl Into<String>, action: ToolCall) -> Self {
        Self {
            text: text.into(),
            action: Some(action),
            finished: None,
        }
    }
}

/// The model capability trait.
///
/// Any LLM client (hosted API, local inference, a scripted test double)
/// implements this. The loop calls `generate_step()` without knowing which
/// backend is behind it.
#[async_trait]
pub trait ModelCapability: Send + Sync {
    /// A human-readable name for this capability (used in logs).
    fn name(&self) -> &str;

    /// Produce the next step for the given request.
    async fn generate_step(&self, request: ModelRequest) -> std::result::Result<ModelStep, ModelError>;
}
