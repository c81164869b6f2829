//! # StepClaw Core
//!
//! Domain types, traits, and error definitions for the StepClaw agent
//! orchestration runtime. This crate has **no framework dependencies**: it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here. Implementations live in their
//! respective crates (or in the embedding application). This enables:
//! - Plugging any model client behind [`ModelCapability`]
//! - Testing the loop with scripted models and in-memory tool servers
//! - A clean dependency graph (all crates depend inward on core)

pub mod agent;
pub mod context;
pub mod elicitation;
pub mod error;
pub mod event;
pub mod message;
pub mod model;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentResult, AgentStep, LoopState, StepOutcome, StepPhase, Strategy, TerminationStatus};
pub use context::{AgentContext, AttachedResource};
pub use elicitation::{
    ElicitationAction, ElicitationRequest, ElicitationResponse, FieldSchema, InputSchema,
};
pub use error::{ElicitationError, Error, ErrorKind, ModelError, ToolError};
pub use event::{AgentEvent, EventEnvelope, EventSink, EventStream};
pub use message::{Conversation, ConversationId, Message, Role};
pub use model::{ModelCapability, ModelRequest, ModelStep, RequestMode, ToolDefinition};
pub use tool::{Artifact, ToolCall, ToolExecutor, ToolResult};
