//! Tool plumbing for StepClaw.
//!
//! Tool servers declare tools and execute them by name. This crate keeps
//! the registry of connected servers, and routes every call through one
//! [`ToolInvoker`] that re-checks authorization, binds caller identity and
//! attached files, applies timeouts, and normalizes what comes back.
//!
//! Servers that need user input mid-call go through the
//! [`ElicitationRouter`], which correlates requests with answers that
//! arrive on a different path.

pub mod arguments;
pub mod elicitation;
pub mod invoker;
pub mod normalize;
pub mod registry;
pub mod server;
pub mod suggest;

pub use arguments::{ArgumentOverride, PreparedArguments};
pub use elicitation::{Awaited, ElicitationRouter, RouterHandle};
pub use invoker::ToolInvoker;
pub use normalize::normalize;
pub use registry::{ResolvedTool, ServerRegistry};
pub use server::{ServerNotification, ToolReply, ToolServer};
pub use suggest::{merge_selection, patterns_for_extension, suggest_for_resources};
