//! Step policies for the three strategies.
//!
//! Every strategy runs the same loop skeleton. They differ only in:
//! - which request mode each step uses (think_act alternates)
//! - whether a mode may act and is offered tool schemas
//! - the framing instruction sent with each call
//! - how a tool result is rendered back into the conversation

use stepclaw_core::{Message, RequestMode, Strategy, ToolCall, ToolResult};

/// What varies between strategies.
pub trait StepPolicy {
    /// Mode of the first step of a run.
    fn first_mode(&self) -> RequestMode;

    /// Mode of the step after one that used `current`.
    fn next_mode(&self, current: RequestMode) -> RequestMode;

    /// Whether an action extracted in `mode` is honoured.
    fn allows_action(&self, mode: RequestMode) -> bool {
        matches!(mode, RequestMode::Act | RequestMode::ReasonAndAct)
    }

    /// Whether tool schemas go out with a request in `mode`.
    fn offers_tools(&self, mode: RequestMode) -> bool {
        self.allows_action(mode)
    }

    /// Instruction sent as the leading system message for `mode`.
    fn framing(&self, mode: RequestMode) -> &'static str;

    /// The message that carries a tool result back to the model.
    fn observation(&self, call: &ToolCall, result: &ToolResult) -> Message;
}

impl StepPolicy for Strategy {
    fn first_mode(&self) -> RequestMode {
        match self {
            Strategy::ThinkAct => RequestMode::Reason,
            Strategy::React => RequestMode::ReasonAndAct,
            Strategy::Act => RequestMode::Act,
        }
    }

    fn next_mode(&self, current: RequestMode) -> RequestMode {
        match (self, current) {
            (Strategy::ThinkAct, RequestMode::Reason) => RequestMode::Act,
            (Strategy::ThinkAct, _) => RequestMode::Reason,
            (other, _) => other.first_mode(),
        }
    }

    fn framing(&self, mode: RequestMode) -> &'static str {
        match (self, mode) {
            (_, RequestMode::FinalAnswer) => {
                "Answer the user's request using only the conversation so far."
            }
            (Strategy::ThinkAct, RequestMode::Reason) => {
                "Think about the next step. Do not call any tool in this turn."
            }
            (Strategy::React, _) => {
                "Respond with 'Thought:' followed by either 'Action:' with one tool call \
                 or 'Final Answer:' with your answer."
            }
            _ => "Call exactly one tool, or give your final answer prefixed with 'Final Answer:'.",
        }
    }

    fn observation(&self, call: &ToolCall, result: &ToolResult) -> Message {
        match self {
            Strategy::React => Message::user(format!("Observation: {}", result.observation_text())),
            _ => Message::tool_result(&call.id, result.observation_text()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepclaw_core::{ErrorKind, Role};

    #[test]
    fn think_act_alternates() {
        let s = Strategy::ThinkAct;
        assert_eq!(s.first_mode(), RequestMode::Reason);
        assert_eq!(s.next_mode(RequestMode::Reason), RequestMode::Act);
        assert_eq!(s.next_mode(RequestMode::Act), RequestMode::Reason);
        assert!(!s.allows_action(RequestMode::Reason));
        assert!(!s.offers_tools(RequestMode::Reason));
        assert!(s.offers_tools(RequestMode::Act));
    }

    #[test]
    fn react_and_act_keep_one_mode() {
        assert_eq!(Strategy::React.next_mode(RequestMode::ReasonAndAct), RequestMode::ReasonAndAct);
        assert_eq!(Strategy::Act.next_mode(RequestMode::Act), RequestMode::Act);
        assert!(!Strategy::Act.offers_tools(RequestMode::FinalAnswer));
    }

    #[test]
    fn observation_rendering() {
        let call = ToolCall::new("c1", "search_web", json!({}));
        let result = ToolResult::failure("c1", ErrorKind::ToolTimeout, "too slow");

        let react = Strategy::React.observation(&call, &result);
        assert_eq!(react.role, Role::User);
        assert!(react.content.starts_with("Observation: Error (tool_timeout)"));

        let act = Strategy::Act.observation(&call, &result);
        assert_eq!(act.role, Role::Tool);
        assert_eq!(act.tool_call_id.as_deref(), Some("c1"));
    }

    #[test]
    fn react_framing_names_segments() {
        let framing = Strategy::React.framing(RequestMode::ReasonAndAct);
        assert!(framing.contains("Thought:"));
        assert!(framing.contains("Final Answer:"));
    }
}
