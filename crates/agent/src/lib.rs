//! The agent loop engine for StepClaw.
//!
//! A run repeatedly asks the model for its next step, extracts at most one
//! action from the reply, executes tool calls through the [`ToolExecutor`]
//! seam, and feeds observations back until:
//!
//! 1. the model gives a **final answer** (`completed`)
//! 2. the step budget is spent and a forced answer is taken (`max_steps_reached`)
//! 3. model retries are exhausted or the run is cancelled (`aborted`)
//!
//! Three strategies share the loop: `think_act`, `react`, and `act`.
//!
//! [`ToolExecutor`]: stepclaw_core::ToolExecutor

pub mod extractor;
pub mod loop_runner;
pub mod strategy;
pub mod termination;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use extractor::{Action, Extraction, extract, should_attempt_content_parsing};
pub use loop_runner::{AgentLoop, LoopConfig};
pub use strategy::StepPolicy;
pub use termination::{TerminationPolicy, Verdict};
