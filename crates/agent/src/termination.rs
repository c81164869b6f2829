//! Termination policy: the safety bounds checked before every model call.

use stepclaw_core::{AgentStep, LoopState, Message, StepOutcome};

/// Appended to every request once the model has stalled.
pub const NON_ACTION_DIRECTIVE: &str = "You have produced several replies without acting. \
    In this reply, call exactly one of the available tools or give your final answer \
    prefixed with 'Final Answer:'.";

/// Appended to the forced final-answer request.
pub const FORCED_FINAL_DIRECTIVE: &str = "The step limit has been reached. No more tools \
    can be called. Give your best final answer now, based only on the conversation above.";

/// Used when no usable answer could be obtained.
pub const FALLBACK_ANSWER: &str =
    "I was unable to complete this request within the allowed steps. Please try again or rephrase.";

/// What the loop must do before the next model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Proceed normally, optionally with the corrective directive.
    Continue { directive: bool },
    /// Spend the last step on a forced final answer.
    ForceFinal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationPolicy {
    pub max_steps: u32,
    pub non_action_limit: u32,
}

impl TerminationPolicy {
    pub fn new(max_steps: u32, non_action_limit: u32) -> Self {
        Self {
            max_steps: max_steps.max(1),
            non_action_limit: non_action_limit.max(1),
        }
    }

    pub fn check(&self, state: &LoopState) -> Verdict {
        if state.step_count + 1 >= self.max_steps {
            return Verdict::ForceFinal;
        }
        Verdict::Continue {
            directive: state.consecutive_non_action >= self.non_action_limit,
        }
    }
}

/// The corrective directive as a transient message.
pub fn non_action_directive() -> Message {
    Message::system(NON_ACTION_DIRECTIVE)
}

pub fn forced_final_directive() -> Message {
    Message::system(FORCED_FINAL_DIRECTIVE)
}

/// Best answer available from a log that ended abnormally: the latest
/// reasoning or successful observation, else the generic fallback.
pub fn best_effort_answer(steps: &[AgentStep]) -> String {
    steps
        .iter()
        .rev()
        .find_map(|s| {
            if let Some(answer) = s.answer.as_ref().filter(|a| !a.trim().is_empty()) {
                return Some(answer.clone());
            }
            if let Some(StepOutcome::Tool { result }) = &s.outcome
                && result.success
                && !result.content.trim().is_empty()
            {
                return Some(result.content.clone());
            }
            s.reasoning.clone().filter(|r| !r.trim().is_empty())
        })
        .unwrap_or_else(|| FALLBACK_ANSWER.to_string())
}
