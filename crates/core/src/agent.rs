//! Step log, loop state, and run result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::model::RequestMode;
use crate::tool::{ToolCall, ToolResult};

/// How the loop orders thinking and acting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Alternate a reasoning-only call and an acting call
    ThinkAct,
    /// One call per step with Thought / Action / Final Answer segments
    #[default]
    React,
    /// Every call selects an action or final answer directly
    Act,
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "think_act" => Ok(Self::ThinkAct),
            "react" => Ok(Self::React),
            "act" => Ok(Self::Act),
            other => Err(format!("unknown strategy '{other}' (expected think_act, react, or act)")),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ThinkAct => "think_act",
            Self::React => "react",
            Self::Act => "act",
        })
    }
}

/// The last transition a step reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    Thinking,
    Acting,
    Observing,
    Final,
}

/// Why a run ended (or that it has not yet).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationStatus {
    #[default]
    Running,
    Completed,
    MaxStepsReached,
    Aborted,
}

impl std::fmt::Display for TerminationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::MaxStepsReached => "max_steps_reached",
            Self::Aborted => "aborted",
        })
    }
}

/// What a step produced besides text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The tool pipeline returned a result (successful or not)
    Tool { result: ToolResult },
    /// The step itself failed (model call, cancellation)
    Error { kind: ErrorKind, message: String },
}

/// One iteration's record. Never mutated after it is appended to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStep {
    /// 1-based, strictly increasing, no gaps
    pub index: u32,

    pub phase: StepPhase,

    /// What the loop asked the model for in this step
    pub mode: RequestMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ToolCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<StepOutcome>,

    /// Final answer text, for `Final` steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl AgentStep {
    /// Whether this step asked for an action but got neither a tool call
    /// nor a final answer.
    pub fn is_non_action(&self) -> bool {
        self.mode != RequestMode::Reason
            && self.phase == StepPhase::Thinking
            && self.outcome.is_none()
    }
}

/// Per-run mutable state. Owned by exactly one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopState {
    pub step_count: u32,
    pub consecutive_non_action: u32,
    pub strategy: Strategy,
    /// Mode of the next model call (alternates for think_act)
    pub next_mode: RequestMode,
    pub status: TerminationStatus,
}

impl LoopState {
    pub fn new(strategy: Strategy, first_mode: RequestMode) -> Self {
        Self {
            step_count: 0,
            consecutive_non_action: 0,
            strategy,
            next_mode: first_mode,
            status: TerminationStatus::Running,
        }
    }

    /// Index the next step will get.
    pub fn next_index(&self) -> u32 {
        self.step_count + 1
    }

    /// An action or final answer was produced.
    pub fn record_action(&mut self) {
        self.consecutive_non_action = 0;
    }

    /// A step that could have acted produced only reasoning.
    pub fn record_non_action(&mut self) {
        self.consecutive_non_action += 1;
    }

    /// Rebuild counters from a persisted log.
    ///
    /// Reasoning-phase steps neither increment nor reset the non-action
    /// counter, matching how they were counted live.
    pub fn from_log(strategy: Strategy, first_mode: RequestMode, steps: &[AgentStep]) -> Self {
        let mut state = Self::new(strategy, first_mode);
        state.step_count = steps.last().map(|s| s.index).unwrap_or(0);
        state.consecutive_non_action = steps
            .iter()
            .rev()
            .filter(|s| s.mode != RequestMode::Reason)
            .take_while(|s| s.is_non_action())
            .count() as u32;
        if steps.last().is_some_and(|s| s.phase == StepPhase::Final) {
            state.status = TerminationStatus::Completed;
        }
        state
    }
}

/// What a run hands back to the caller, whatever the outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    /// Final (or best-effort) answer text
    pub answer: String,

    /// The complete, append-only step log
    pub steps: Vec<AgentStep>,

    pub status: TerminationStatus,

    /// Tool calls issued during this run
    pub tool_calls_made: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(index: u32, phase: StepPhase, mode: RequestMode) -> AgentStep {
        AgentStep {
            index,
            phase,
            mode,
            reasoning: Some("...".into()),
            action: None,
            outcome: None,
            answer: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn strategy_parses_variants() {
        assert_eq!("think-act".parse::<Strategy>().unwrap(), Strategy::ThinkAct);
        assert_eq!("ReAct".parse::<Strategy>().unwrap(), Strategy::React);
        assert_eq!("act".parse::<Strategy>().unwrap(), Strategy::Act);
        assert!("plan".parse::<Strategy>().is_err());
    }

    #[test]
    fn counters_track_actions() {
        let mut state = LoopState::new(Strategy::Act, RequestMode::Act);
        state.record_non_action();
        state.record_non_action();
        assert_eq!(state.consecutive_non_action, 2);
        state.record_action();
        assert_eq!(state.consecutive_non_action, 0);
        assert_eq!(state.next_index(), 1);
    }

    #[test]
    fn from_log_skips_reasoning_phase_steps() {
        let steps = vec![
            step(1, StepPhase::Observing, RequestMode::Act),
            step(2, StepPhase::Thinking, RequestMode::Reason),
            step(3, StepPhase::Thinking, RequestMode::Act),
            step(4, StepPhase::Thinking, RequestMode::Reason),
            step(5, StepPhase::Thinking, RequestMode::Act),
        ];
        let state = LoopState::from_log(Strategy::ThinkAct, RequestMode::Reason, &steps);
        assert_eq!(state.step_count, 5);
        assert_eq!(state.consecutive_non_action, 2);
        assert_eq!(state.status, TerminationStatus::Running);
    }

    #[test]
    fn from_log_detects_finished_run() {
        let steps = vec![step(1, StepPhase::Final, RequestMode::ReasonAndAct)];
        let state = LoopState::from_log(Strategy::React, RequestMode::ReasonAndAct, &steps);
        assert_eq!(state.status, TerminationStatus::Completed);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&TerminationStatus::MaxStepsReached).unwrap();
        assert_eq!(json, r#""max_steps_reached""#);
    }
}
