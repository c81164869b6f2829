//! The agent loop engine.
//!
//! One run drives the model step by step until it produces a final answer,
//! runs out of steps, exhausts its model retries, or is cancelled. Each step
//! is appended to the step log exactly once and announced on the event sink
//! in index order.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use stepclaw_config::AgentSettings;
use stepclaw_core::{
    AgentContext, AgentEvent, AgentResult, AgentStep, Conversation, ErrorKind, EventSink,
    LoopState, Message, ModelCapability, ModelError, ModelRequest, ModelStep, RequestMode,
    StepOutcome, StepPhase, Strategy, TerminationStatus, ToolCall, ToolDefinition, ToolExecutor,
};

use crate::extractor::{self, Action};
use crate::strategy::StepPolicy;
use crate::termination::{
    self, FALLBACK_ANSWER, TerminationPolicy, Verdict, best_effort_answer,
};

/// Loop policy for one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    pub strategy: Strategy,
    pub max_steps: u32,
    pub non_action_limit: u32,
    pub model_retries: u32,
    /// Delay before the first retry; doubles on each further attempt
    pub retry_backoff: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from(&AgentSettings::default())
    }
}

impl From<&AgentSettings> for LoopConfig {
    fn from(settings: &AgentSettings) -> Self {
        Self {
            strategy: settings.strategy,
            max_steps: settings.max_steps,
            non_action_limit: settings.non_action_limit,
            model_retries: settings.model_retries,
            retry_backoff: Duration::from_millis(settings.retry_backoff_ms),
        }
    }
}

/// Why a model call produced no step.
enum CallFailure {
    Cancelled,
    Model(ModelError),
}

/// Drives model calls and tool executions for a run.
pub struct AgentLoop {
    model: Arc<dyn ModelCapability>,
    tools: Arc<dyn ToolExecutor>,
    events: EventSink,
    config: LoopConfig,
    cancel: CancellationToken,
}

impl AgentLoop {
    pub fn new(
        model: Arc<dyn ModelCapability>,
        tools: Arc<dyn ToolExecutor>,
        events: EventSink,
        config: LoopConfig,
    ) -> Self {
        Self {
            model,
            tools,
            events,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.config.max_steps = max_steps;
        self
    }

    /// Tie the loop to an external cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// A handle that cancels this loop's runs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Run from the start of the conversation's pending request.
    pub async fn run(&self, context: &AgentContext, conversation: &mut Conversation) -> AgentResult {
        self.resume(context, conversation, Vec::new()).await
    }

    /// Continue a run from a persisted step log.
    ///
    /// Indices continue after the last prior step; a log that already ends
    /// in a final answer is returned as is.
    pub async fn resume(
        &self,
        context: &AgentContext,
        conversation: &mut Conversation,
        prior_steps: Vec<AgentStep>,
    ) -> AgentResult {
        let strategy = self.config.strategy;
        let mut state = LoopState::from_log(strategy, strategy.first_mode(), &prior_steps);
        let tool_calls_made = prior_steps.iter().filter(|s| s.action.is_some()).count();

        if let Some(last) = prior_steps.last() {
            if last.phase == StepPhase::Final {
                let status = if last.mode == RequestMode::FinalAnswer {
                    TerminationStatus::MaxStepsReached
                } else {
                    TerminationStatus::Completed
                };
                return AgentResult {
                    answer: last.answer.clone().unwrap_or_default(),
                    steps: prior_steps,
                    status,
                    tool_calls_made,
                };
            }
            state.next_mode = strategy.next_mode(last.mode);
            info!(
                session_id = %context.session_id,
                prior_steps = prior_steps.len(),
                "Resuming agent run"
            );
        }

        let mut run = Run {
            context,
            conversation,
            state,
            steps: prior_steps,
            tool_calls_made,
            definitions: self.tools.definitions(context),
        };
        self.drive(&mut run).await
    }

    async fn drive(&self, run: &mut Run<'_>) -> AgentResult {
        let policy = TerminationPolicy::new(self.config.max_steps, self.config.non_action_limit);
        let tool_names: Vec<String> = run.definitions.iter().map(|d| d.name.clone()).collect();

        info!(
            session_id = %run.context.session_id,
            strategy = %self.config.strategy,
            max_steps = policy.max_steps,
            tools = tool_names.len(),
            "Starting agent run"
        );

        loop {
            let index = run.state.next_index();
            let mode = run.state.next_mode;
            if self.cancel.is_cancelled() {
                return self.abort_cancelled(run, index, mode, None).await;
            }

            let directive = match policy.check(&run.state) {
                Verdict::ForceFinal => return self.forced_final(run, index).await,
                Verdict::Continue { directive } => directive,
            };

            let strategy = self.config.strategy;
            self.events.emit(AgentEvent::StepStarted {
                index,
                phase: StepPhase::Thinking,
            });
            debug!(session_id = %run.context.session_id, step = index, ?mode, "Agent step");

            let mut messages = Vec::with_capacity(run.conversation.messages.len() + 2);
            messages.push(Message::system(strategy.framing(mode)));
            messages.extend(run.conversation.messages.iter().cloned());
            if directive && strategy.allows_action(mode) {
                debug!(step = index, "Appending non-action directive");
                messages.push(termination::non_action_directive());
            }
            let request = ModelRequest {
                messages,
                tools: if strategy.offers_tools(mode) {
                    run.definitions.clone()
                } else {
                    Vec::new()
                },
                mode,
            };

            let reply = match self.call_model(request).await {
                Ok(reply) => reply,
                Err(CallFailure::Cancelled) => {
                    return self.abort_cancelled(run, index, mode, None).await;
                }
                Err(CallFailure::Model(e)) => return self.abort_model_failure(run, index, mode, e),
            };

            if !strategy.allows_action(mode) {
                // Reasoning-only call: any action is ignored
                let text = reply.text.trim().to_string();
                self.emit_reasoning(&text);
                if !text.is_empty() {
                    run.conversation.push(Message::assistant(text.clone()));
                }
                let mut step = new_step(index, StepPhase::Thinking, mode);
                step.reasoning = Some(text);
                self.finish_step(run, step);
                continue;
            }

            let extraction = extractor::extract(&reply, &tool_names);
            match extraction.action {
                Action::FinalAnswer(answer) => {
                    let answer = if answer.is_empty() {
                        extraction.visible_text.clone()
                    } else {
                        answer
                    };
                    run.state.record_action();
                    run.conversation.push(Message::assistant(answer.clone()));
                    let mut step = new_step(index, StepPhase::Final, mode);
                    step.reasoning = reasoning_before_answer(&reply.text);
                    step.answer = Some(answer.clone());
                    self.finish_step(run, step);
                    return self.finish(run, answer, TerminationStatus::Completed);
                }
                Action::ToolCall(call) => {
                    self.emit_reasoning(&extraction.visible_text);
                    run.state.record_action();
                    run.tool_calls_made += 1;
                    run.conversation.push(Message::assistant_action(
                        extraction.visible_text.clone(),
                        call.clone(),
                    ));
                    self.events.emit(AgentEvent::ToolSelected {
                        call_id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    });

                    let result = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => None,
                        result = self.tools.execute(&call, run.context) => Some(result),
                    };
                    let Some(result) = result else {
                        return self
                            .abort_cancelled(run, index, mode, Some((extraction.visible_text, call)))
                            .await;
                    };

                    self.events.emit(AgentEvent::ToolResult {
                        call_id: call.id.clone(),
                        success: result.success,
                        summary: result.summary(),
                    });
                    run.conversation.push(strategy.observation(&call, &result));

                    let mut step = new_step(index, StepPhase::Observing, mode);
                    step.reasoning = non_empty(extraction.visible_text);
                    step.action = Some(call);
                    step.outcome = Some(StepOutcome::Tool { result });
                    self.finish_step(run, step);
                }
                Action::None => {
                    self.emit_reasoning(&extraction.visible_text);
                    run.state.record_non_action();
                    if !extraction.visible_text.is_empty() {
                        run.conversation
                            .push(Message::assistant(extraction.visible_text.clone()));
                    }
                    debug!(
                        step = index,
                        consecutive = run.state.consecutive_non_action,
                        "Step produced no action"
                    );
                    let mut step = new_step(index, StepPhase::Thinking, mode);
                    step.reasoning = Some(extraction.visible_text);
                    self.finish_step(run, step);
                }
            }
        }
    }

    /// Spend the last permitted step on an answer from the transcript alone.
    async fn forced_final(&self, run: &mut Run<'_>, index: u32) -> AgentResult {
        warn!(
            session_id = %run.context.session_id,
            step = index,
            max_steps = self.config.max_steps,
            "Step limit reached, forcing final answer"
        );
        self.events.emit(AgentEvent::StepStarted {
            index,
            phase: StepPhase::Final,
        });

        let mut messages = run.conversation.messages.clone();
        messages.push(termination::forced_final_directive());
        let request = ModelRequest {
            messages,
            tools: Vec::new(),
            mode: RequestMode::FinalAnswer,
        };

        let answer = match self.call_model(request).await {
            Ok(reply) => forced_answer_text(&reply),
            Err(CallFailure::Cancelled) => {
                return self.abort_cancelled(run, index, RequestMode::FinalAnswer, None).await;
            }
            Err(CallFailure::Model(e)) => {
                warn!(error = %e, "Forced final answer failed");
                FALLBACK_ANSWER.to_string()
            }
        };

        run.conversation.push(Message::assistant(answer.clone()));
        let mut step = new_step(index, StepPhase::Final, RequestMode::FinalAnswer);
        step.answer = Some(answer.clone());
        self.finish_step(run, step);
        self.finish(run, answer, TerminationStatus::MaxStepsReached)
    }

    /// Record the interrupted step once and end the run as aborted.
    async fn abort_cancelled(
        &self,
        run: &mut Run<'_>,
        index: u32,
        mode: RequestMode,
        in_flight: Option<(String, ToolCall)>,
    ) -> AgentResult {
        info!(session_id = %run.context.session_id, step = index, "Agent run cancelled");
        self.tools.abort_pending().await;

        let mut step = new_step(index, StepPhase::Thinking, mode);
        if let Some((reasoning, call)) = in_flight {
            step.phase = StepPhase::Acting;
            step.reasoning = non_empty(reasoning);
            step.action = Some(call);
        } else {
            step.outcome = Some(StepOutcome::Error {
                kind: ErrorKind::ModelCallFailed,
                message: "run cancelled before the model replied".into(),
            });
        }
        self.finish_step(run, step);
        let answer = best_effort_answer(&run.steps);
        self.finish(run, answer, TerminationStatus::Aborted)
    }

    fn abort_model_failure(
        &self,
        run: &mut Run<'_>,
        index: u32,
        mode: RequestMode,
        error: ModelError,
    ) -> AgentResult {
        warn!(
            session_id = %run.context.session_id,
            step = index,
            error = %error,
            "Model call failed after retries, aborting run"
        );
        let mut step = new_step(index, StepPhase::Thinking, mode);
        step.outcome = Some(StepOutcome::Error {
            kind: ErrorKind::ModelCallFailed,
            message: error.to_string(),
        });
        self.finish_step(run, step);
        let answer = best_effort_answer(&run.steps);
        self.finish(run, answer, TerminationStatus::Aborted)
    }

    /// Call the model with bounded retries and exponential backoff.
    async fn call_model(&self, request: ModelRequest) -> Result<ModelStep, CallFailure> {
        let mut attempt = 0;
        loop {
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(CallFailure::Cancelled),
                outcome = self.model.generate_step(request.clone()) => outcome,
            };

            let error = match outcome {
                Ok(step) => return Ok(step),
                Err(e) => e,
            };
            if attempt >= self.config.model_retries {
                return Err(CallFailure::Model(error));
            }

            let mut delay = self
                .config
                .retry_backoff
                .saturating_mul(2u32.saturating_pow(attempt));
            if let ModelError::RateLimited { retry_after_secs } = &error {
                delay = delay.max(Duration::from_secs(*retry_after_secs));
            }
            attempt += 1;
            warn!(
                model = self.model.name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Model call failed, retrying"
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(CallFailure::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn emit_reasoning(&self, text: &str) {
        if !text.is_empty() {
            self.events.emit(AgentEvent::Reasoning {
                text: text.to_string(),
            });
        }
    }

    fn finish_step(&self, run: &mut Run<'_>, step: AgentStep) {
        let index = step.index;
        run.state.step_count = index;
        run.state.next_mode = self.config.strategy.next_mode(step.mode);
        run.steps.push(step);
        self.events.emit(AgentEvent::StepCompleted { index });
    }

    fn finish(&self, run: &mut Run<'_>, answer: String, status: TerminationStatus) -> AgentResult {
        run.state.status = status;
        info!(
            session_id = %run.context.session_id,
            steps = run.steps.len(),
            tool_calls = run.tool_calls_made,
            %status,
            "Agent run finished"
        );
        self.events.emit(AgentEvent::FinalAnswer {
            text: answer.clone(),
            termination_status: status,
        });
        AgentResult {
            answer,
            steps: std::mem::take(&mut run.steps),
            status,
            tool_calls_made: run.tool_calls_made,
        }
    }
}

/// Mutable state of one run.
struct Run<'a> {
    context: &'a AgentContext,
    conversation: &'a mut Conversation,
    state: LoopState,
    steps: Vec<AgentStep>,
    tool_calls_made: usize,
    definitions: Vec<ToolDefinition>,
}

fn new_step(index: u32, phase: StepPhase, mode: RequestMode) -> AgentStep {
    AgentStep {
        index,
        phase,
        mode,
        reasoning: None,
        action: None,
        outcome: None,
        answer: None,
        timestamp: Utc::now(),
    }
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

/// Text preceding a final answer marker, e.g. a ReAct `Thought:` segment.
fn reasoning_before_answer(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let cut = lower
        .find("final answer")
        .or_else(|| lower.find("<final_answer>"))?;
    non_empty(text[..cut].trim().to_string())
}

fn forced_answer_text(reply: &ModelStep) -> String {
    let answer = extractor::final_answer_text(&reply.text)
        .unwrap_or_else(|| reply.text.trim().to_string());
    if answer.is_empty() {
        FALLBACK_ANSWER.to_string()
    } else {
        answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{MockExecutor, ScriptedModel};
    use serde_json::json;
    use stepclaw_core::{EventStream, Role};

    fn agent(model: Arc<ScriptedModel>, tools: Arc<MockExecutor>, strategy: Strategy) -> (AgentLoop, EventStream) {
        let (sink, events) = EventSink::channel("sess");
        let config = LoopConfig {
            strategy,
            retry_backoff: Duration::from_millis(10),
            ..LoopConfig::default()
        };
        (AgentLoop::new(model, tools, sink, config), events)
    }

    fn conversation() -> Conversation {
        let mut conv = Conversation::new();
        conv.push(Message::user("What's the weather in Oslo?"));
        conv
    }

    fn ctx() -> AgentContext {
        AgentContext::new("sess", "alice")
    }

    fn assert_contiguous(steps: &[AgentStep]) {
        for (i, step) in steps.iter().enumerate() {
            assert_eq!(step.index, i as u32 + 1);
        }
    }

    #[tokio::test]
    async fn react_tool_then_answer() {
        let model = Arc::new(ScriptedModel::new(vec![
            ModelStep::text(
                r#"Thought: I need the weather. Action: {"name": "weather_lookup", "arguments": {"city": "Oslo"}}"#,
            ),
            ModelStep::text("Thought: I have it.\nFinal Answer: 12°C and cloudy"),
        ]));
        let tools = Arc::new(MockExecutor::new(&["weather_lookup"]));
        let (agent, mut events) = agent(model.clone(), tools.clone(), Strategy::React);

        let mut conv = conversation();
        let result = agent.run(&ctx(), &mut conv).await;

        assert_eq!(result.status, TerminationStatus::Completed);
        assert_eq!(result.answer, "12°C and cloudy");
        assert_eq!(result.tool_calls_made, 1);
        assert_contiguous(&result.steps);
        assert_eq!(result.steps[0].phase, StepPhase::Observing);
        assert_eq!(result.steps[1].phase, StepPhase::Final);
        assert_eq!(result.steps[1].reasoning.as_deref(), Some("Thought: I have it."));

        // Observation was rendered into the conversation for the second call
        let second = &model.requests()[1];
        assert!(
            second
                .messages
                .iter()
                .any(|m| m.role == Role::User
                    && m.content == "Observation: result of weather_lookup")
        );
        assert_eq!(tools.calls()[0].arguments, json!({"city": "Oslo"}));

        let kinds: Vec<&str> = events.drain().iter().map(|e| e.event.event_type()).collect();
        assert_eq!(
            kinds,
            vec![
                "step_started",
                "reasoning",
                "tool_selected",
                "tool_result",
                "step_completed",
                "step_started",
                "step_completed",
                "final_answer",
            ]
        );
    }

    #[tokio::test]
    async fn think_act_reasoning_only_hits_step_limit() {
        let model = Arc::new(ScriptedModel::repeating(ModelStep::text("Still thinking.")));
        let tools = Arc::new(MockExecutor::new(&["search_web"]));
        let (agent, mut events) = agent(model.clone(), tools, Strategy::ThinkAct);
        let agent = agent.with_max_steps(5);

        let result = agent.run(&ctx(), &mut conversation()).await;

        assert_eq!(result.status, TerminationStatus::MaxStepsReached);
        assert_eq!(result.steps.len(), 5);
        assert_contiguous(&result.steps);
        assert_eq!(result.steps[4].phase, StepPhase::Final);
        assert_eq!(result.answer, "Still thinking.");
        assert_eq!(model.requests().len(), 5);

        let modes: Vec<RequestMode> = model.requests().iter().map(|r| r.mode).collect();
        assert_eq!(
            modes,
            vec![
                RequestMode::Reason,
                RequestMode::Act,
                RequestMode::Reason,
                RequestMode::Act,
                RequestMode::FinalAnswer,
            ]
        );
        // Reasoning calls never carry tools
        assert!(model.requests()[0].tools.is_empty());
        assert_eq!(model.requests()[1].tools.len(), 1);

        let last = events.drain().pop().unwrap();
        assert_eq!(
            last.event,
            AgentEvent::FinalAnswer {
                text: "Still thinking.".into(),
                termination_status: TerminationStatus::MaxStepsReached,
            }
        );
    }

    #[tokio::test]
    async fn directive_after_three_non_actions_then_reset() {
        let model = Arc::new(ScriptedModel::new(vec![
            ModelStep::text("hmm"),
            ModelStep::text("hmm"),
            ModelStep::text("hmm"),
            ModelStep::text(r#"{"tool": "search_web", "parameters": {"q": "x"}}"#),
            ModelStep::text("hmm"),
            ModelStep::text("Final Answer: done"),
        ]));
        let tools = Arc::new(MockExecutor::new(&["search_web"]));
        let (agent, _events) = agent(model.clone(), tools, Strategy::Act);

        let result = agent.run(&ctx(), &mut conversation()).await;
        assert_eq!(result.status, TerminationStatus::Completed);

        let has_directive: Vec<bool> = model
            .requests()
            .iter()
            .map(|r| {
                r.messages
                    .iter()
                    .any(|m| m.content == termination::NON_ACTION_DIRECTIVE)
            })
            .collect();
        assert_eq!(has_directive, vec![false, false, false, true, false, false]);
    }

    #[tokio::test]
    async fn directive_is_not_persisted() {
        let model = Arc::new(ScriptedModel::new(vec![
            ModelStep::text("a"),
            ModelStep::text("b"),
            ModelStep::text("c"),
            ModelStep::finished("ok"),
        ]));
        let (agent, _events) = agent(model, Arc::new(MockExecutor::new(&[])), Strategy::React);
        let mut conv = conversation();
        agent.run(&ctx(), &mut conv).await;
        assert!(
            !conv
                .messages
                .iter()
                .any(|m| m.content == termination::NON_ACTION_DIRECTIVE)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn model_retries_then_succeeds() {
        let model = Arc::new(ScriptedModel::with_results(vec![
            Err(ModelError::Network("reset".into())),
            Err(ModelError::Timeout("slow".into())),
            Ok(ModelStep::finished("recovered")),
        ]));
        let (agent, _events) = agent(model.clone(), Arc::new(MockExecutor::new(&[])), Strategy::Act);
        let result = agent.run(&ctx(), &mut conversation()).await;
        assert_eq!(result.status, TerminationStatus::Completed);
        assert_eq!(result.answer, "recovered");
        assert_eq!(result.steps.len(), 1);
        assert_eq!(model.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_abort() {
        let model = Arc::new(ScriptedModel::with_results(vec![
            Err(ModelError::Network("down".into())),
            Err(ModelError::Network("down".into())),
            Err(ModelError::Network("down".into())),
        ]));
        let (agent, _events) = agent(model.clone(), Arc::new(MockExecutor::new(&[])), Strategy::Act);
        let result = agent.run(&ctx(), &mut conversation()).await;

        assert_eq!(result.status, TerminationStatus::Aborted);
        assert_eq!(result.answer, FALLBACK_ANSWER);
        assert_eq!(model.requests().len(), 3);
        assert_eq!(result.steps.len(), 1);
        assert!(matches!(
            result.steps[0].outcome,
            Some(StepOutcome::Error {
                kind: ErrorKind::ModelCallFailed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn cancellation_during_tool_call() {
        let model = Arc::new(ScriptedModel::new(vec![ModelStep::text(
            r#"{"tool": "slow_tool", "parameters": {}}"#,
        )]));
        let tools = Arc::new(MockExecutor::new(&["slow_tool"]).with_delay(Duration::from_secs(3600)));
        let (agent, mut events) = agent(model, tools.clone(), Strategy::Act);
        let token = agent.cancellation_token();

        let mut conv = conversation();
        let context = ctx();
        let (result, _) = tokio::join!(agent.run(&context, &mut conv), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        assert_eq!(result.status, TerminationStatus::Aborted);
        assert_eq!(result.steps.len(), 1);
        assert_eq!(result.steps[0].phase, StepPhase::Acting);
        assert!(tools.aborted());

        let last = events.drain().pop().unwrap();
        assert!(matches!(
            last.event,
            AgentEvent::FinalAnswer {
                termination_status: TerminationStatus::Aborted,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let (agent, _events) = agent(model.clone(), Arc::new(MockExecutor::new(&[])), Strategy::React);
        agent.cancellation_token().cancel();
        let result = agent.run(&ctx(), &mut conversation()).await;
        assert_eq!(result.status, TerminationStatus::Aborted);
        assert_eq!(result.steps.len(), 1);
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn resume_continues_indices_and_counter() {
        let first = Arc::new(ScriptedModel::new(vec![
            ModelStep::text("thinking"),
            ModelStep::text("thinking"),
        ]));
        let (agent1, _e1) = agent(first, Arc::new(MockExecutor::new(&[])), Strategy::Act);
        let agent1 = agent1.with_max_steps(3);
        let mut conv = conversation();
        let partial = agent1.run(&ctx(), &mut conv).await;
        // Two reasoning steps, then the forced final (which the script lacks)
        assert_eq!(partial.status, TerminationStatus::MaxStepsReached);
        let prior: Vec<AgentStep> = partial.steps[..2].to_vec();

        let second = Arc::new(ScriptedModel::new(vec![
            ModelStep::text("still thinking"),
            ModelStep::finished("resumed answer"),
        ]));
        let (agent2, _e2) = agent(second.clone(), Arc::new(MockExecutor::new(&[])), Strategy::Act);
        let result = agent2.resume(&ctx(), &mut conv, prior).await;

        assert_eq!(result.status, TerminationStatus::Completed);
        assert_contiguous(&result.steps);
        assert_eq!(result.steps.len(), 4);
        // Third consecutive non-action (index 3) triggers the directive on index 4
        assert!(
            second.requests()[1]
                .messages
                .iter()
                .any(|m| m.content == termination::NON_ACTION_DIRECTIVE)
        );
    }

    #[tokio::test]
    async fn resume_of_finished_log_returns_immediately() {
        let model = Arc::new(ScriptedModel::new(vec![ModelStep::finished("done")]));
        let (agent1, _e) = agent(model, Arc::new(MockExecutor::new(&[])), Strategy::React);
        let mut conv = conversation();
        let finished = agent1.run(&ctx(), &mut conv).await;

        let untouched = Arc::new(ScriptedModel::new(vec![]));
        let (agent2, _e2) = agent(untouched.clone(), Arc::new(MockExecutor::new(&[])), Strategy::React);
        let result = agent2.resume(&ctx(), &mut conv, finished.steps).await;
        assert_eq!(result.status, TerminationStatus::Completed);
        assert_eq!(result.answer, "done");
        assert!(untouched.requests().is_empty());
    }

    #[tokio::test]
    async fn failed_tool_is_observed_not_fatal() {
        let model = Arc::new(ScriptedModel::new(vec![
            ModelStep::with_action("", ToolCall::new("c1", "broken", json!({}))),
            ModelStep::finished("gave up politely"),
        ]));
        let tools = Arc::new(MockExecutor::new(&["broken"]).failing());
        let (agent, _events) = agent(model, tools, Strategy::Act);
        let mut conv = conversation();
        let result = agent.run(&ctx(), &mut conv).await;

        assert_eq!(result.status, TerminationStatus::Completed);
        let Some(StepOutcome::Tool { result: tool_result }) = &result.steps[0].outcome else {
            panic!("expected a tool outcome");
        };
        assert!(!tool_result.success);
        assert!(
            conv.messages
                .iter()
                .any(|m| m.role == Role::Tool && m.content == "Error (tool_invocation_failed): boom")
        );
    }
}
