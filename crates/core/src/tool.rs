//! Tool contract: requested calls, normalized results, and the executor seam.
//!
//! Tools live in external servers. The loop only ever sees a [`ToolCall`]
//! going out and exactly one [`ToolResult`] coming back, produced by a
//! [`ToolExecutor`] that owns authorization, argument preparation, invocation
//! and normalization.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::AgentContext;
use crate::error::ErrorKind;
use crate::model::ToolDefinition;

/// Maximum characters kept in a result summary for events and audit.
const SUMMARY_CHARS: usize = 200;

/// A request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID, unique per step (matches the model's call id when it gave one)
    pub id: String,

    /// Namespaced tool name (`{server}_{tool}`)
    pub name: String,

    /// Arguments as a JSON object
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// An opaque side artifact produced by a tool (file, image, report).
///
/// The core never interprets `data`; it is passed through to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,

    #[serde(default, alias = "mime")]
    pub media_type: Option<String>,

    /// Encoded payload, typically base64
    #[serde(default, alias = "b64")]
    pub data: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The normalized outcome of one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// Primary content, consumed by the model
    pub content: String,

    /// Side artifacts, passed through untouched
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,

    /// Display hints for the UI (opaque)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<serde_json::Value>,

    /// Tool-provided metadata (opaque)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,

    /// Failure classification when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ToolResult {
    /// A successful result with text content and nothing else.
    pub fn success(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: true,
            content: content.into(),
            artifacts: Vec::new(),
            display: None,
            metadata: None,
            error_kind: None,
        }
    }

    /// A failed result carrying its error classification.
    pub fn failure(call_id: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: false,
            content: message.into(),
            artifacts: Vec::new(),
            display: None,
            metadata: None,
            error_kind: Some(kind),
        }
    }

    /// The text the model sees for this result.
    pub fn observation_text(&self) -> String {
        if self.success {
            self.content.clone()
        } else {
            let kind = self
                .error_kind
                .unwrap_or(ErrorKind::ToolInvocationFailed);
            format!("Error ({kind}): {}", self.content)
        }
    }

    /// A short single-line summary for events and logs.
    pub fn summary(&self) -> String {
        let text = self.observation_text();
        let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if flat.chars().count() <= SUMMARY_CHARS {
            flat
        } else {
            let mut cut: String = flat.chars().take(SUMMARY_CHARS).collect();
            cut.push('…');
            cut
        }
    }
}

/// The seam between the loop engine and the tool pipeline.
///
/// Implementations must never fail: every error is folded into a
/// `ToolResult` with `success = false` so the model can adapt.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Tool schemas the caller in `context` may see.
    fn definitions(&self, context: &AgentContext) -> Vec<ToolDefinition>;

    /// Execute one call on behalf of the caller in `context`.
    async fn execute(&self, call: &ToolCall, context: &AgentContext) -> ToolResult;

    /// Abort outstanding waits (elicitations) after a session cancellation.
    async fn abort_pending(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_observation_names_kind() {
        let result = ToolResult::failure("c1", ErrorKind::AuthorizationDenied, "not in group");
        assert!(!result.success);
        assert_eq!(
            result.observation_text(),
            "Error (authorization_denied): not in group"
        );
    }

    #[test]
    fn summary_is_flattened_and_truncated() {
        let long = "line one\nline two ".repeat(40);
        let result = ToolResult::success("c1", long);
        let summary = result.summary();
        assert!(!summary.contains('\n'));
        assert!(summary.ends_with('…'));
        assert_eq!(summary.chars().count(), SUMMARY_CHARS + 1);
    }

    #[test]
    fn artifact_accepts_legacy_field_names() {
        let artifact: Artifact = serde_json::from_value(serde_json::json!({
            "name": "report.pdf",
            "b64": "JVBERi0=",
            "mime": "application/pdf",
            "size": 5
        }))
        .unwrap();
        assert_eq!(artifact.media_type.as_deref(), Some("application/pdf"));
        assert_eq!(artifact.data.as_deref(), Some("JVBERi0="));
        assert_eq!(artifact.size, Some(5));
    }
}
