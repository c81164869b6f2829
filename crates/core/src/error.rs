//! Error types for the StepClaw domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`ErrorKind`] is the
//! machine-readable taxonomy attached to failed tool results and step records.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for all StepClaw operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model errors ---
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Elicitation errors ---
    #[error("Elicitation error: {0}")]
    Elicitation(#[from] ElicitationError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Machine-readable failure classification.
///
/// `MaxStepsReached` is a bounded-termination outcome rather than a failure,
/// and `ExtractionAmbiguous` is non-fatal (the step counts as reasoning-only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthorizationDenied,
    ToolInvocationFailed,
    ToolTimeout,
    ElicitationTimeout,
    ElicitationCancelled,
    ModelCallFailed,
    MaxStepsReached,
    ExtractionAmbiguous,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationDenied => "authorization_denied",
            Self::ToolInvocationFailed => "tool_invocation_failed",
            Self::ToolTimeout => "tool_timeout",
            Self::ElicitationTimeout => "elicitation_timeout",
            Self::ElicitationCancelled => "elicitation_cancelled",
            Self::ModelCallFailed => "model_call_failed",
            Self::MaxStepsReached => "max_steps_reached",
            Self::ExtractionAmbiguous => "extraction_ambiguous",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by model backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Model request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed model response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool server unavailable: {0}")]
    ServerUnavailable(String),

    #[error("Elicitation for {tool_name} ended without input: {kind}")]
    InputNotProvided { tool_name: String, kind: ErrorKind },
}

impl ToolError {
    /// Classify this error into the failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied { .. } => ErrorKind::AuthorizationDenied,
            Self::Timeout { .. } => ErrorKind::ToolTimeout,
            Self::InputNotProvided { kind, .. } => *kind,
            Self::NotFound(_)
            | Self::ExecutionFailed { .. }
            | Self::InvalidArguments(_)
            | Self::ServerUnavailable(_) => ErrorKind::ToolInvocationFailed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ElicitationError {
    #[error("No pending elicitation with id {0}")]
    UnknownRequest(String),

    #[error("Elicitation {0} was already settled")]
    AlreadySettled(String),

    #[error("Elicitation {0} is already being awaited")]
    AlreadyAwaited(String),

    #[error("Routing handle for server '{0}' is not registered")]
    UnknownHandle(String),

    #[error("Response to {request_id} is missing or mistypes field '{field}'")]
    InvalidResponse { request_id: String, field: String },
}
