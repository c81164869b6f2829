//! Tool invocation adapter: the one path from a `ToolCall` to a `ToolResult`.
//!
//! Pipeline per call:
//! 1. Re-check authorization (the model may name tools it was never shown)
//! 2. Resolve the namespaced name to a server and tool
//! 3. Prepare arguments (caller identity, attached files)
//! 4. Invoke with a timeout, routing any input request through the
//!    elicitation router and resuming the tool with the answer
//! 5. Normalize the output
//!
//! Nothing here fails outward: every error becomes a failed `ToolResult`
//! carrying its error kind, so the model can see what went wrong and adapt.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use stepclaw_config::AgentSettings;
use stepclaw_core::{
    AgentContext, ElicitationAction, ErrorKind, ToolCall, ToolDefinition, ToolError, ToolExecutor,
    ToolResult,
};
use stepclaw_security::{AuditEvent, AuditOutcome, GateDecision, ToolGate};

use crate::arguments;
use crate::elicitation::{Awaited, ElicitationRouter, RouterHandle};
use crate::normalize::normalize;
use crate::registry::{ResolvedTool, ServerRegistry};
use crate::server::ToolReply;
use crate::suggest::{merge_selection, suggest_for_resources};

/// Input requests one call may make before it is abandoned.
const MAX_ELICITATION_ROUNDS: usize = 8;

/// Executes tool calls against registered servers on behalf of callers.
pub struct ToolInvoker {
    registry: Arc<ServerRegistry>,
    gate: Arc<ToolGate>,
    router: Arc<ElicitationRouter>,
    handles: AsyncMutex<HashMap<String, RouterHandle>>,
    tool_timeout: Duration,
    elicitation_timeout: Duration,
}

impl ToolInvoker {
    pub fn new(registry: Arc<ServerRegistry>, gate: Arc<ToolGate>, router: Arc<ElicitationRouter>) -> Self {
        let defaults = AgentSettings::default();
        Self {
            registry,
            gate,
            router,
            handles: AsyncMutex::new(HashMap::new()),
            tool_timeout: Duration::from_secs(defaults.tool_timeout_secs),
            elicitation_timeout: Duration::from_secs(defaults.elicitation_timeout_secs),
        }
    }

    /// Take both timeouts from configuration.
    pub fn with_settings(self, settings: &AgentSettings) -> Self {
        self.with_tool_timeout(Duration::from_secs(settings.tool_timeout_secs))
            .with_elicitation_timeout(Duration::from_secs(settings.elicitation_timeout_secs))
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_elicitation_timeout(mut self, timeout: Duration) -> Self {
        self.elicitation_timeout = timeout;
        self
    }

    pub fn router(&self) -> &Arc<ElicitationRouter> {
        &self.router
    }

    pub fn gate(&self) -> &Arc<ToolGate> {
        &self.gate
    }

    /// Start a notification listener for every server that has a feed.
    pub async fn start_listeners(&self) -> Vec<JoinHandle<()>> {
        let mut listeners = Vec::new();
        for name in self.registry.server_names() {
            let Some(server) = self.registry.get(&name) else {
                continue;
            };
            if let Some(feed) = server.take_notifications() {
                let handle = self.handle_for(&name).await;
                listeners.push(self.router.spawn_listener(handle, feed, self.elicitation_timeout));
            }
        }
        listeners
    }

    /// Namespaced tool names offered to the caller in `context`.
    ///
    /// With no explicit selection every tool is a candidate; otherwise the
    /// selection plus file-type suggestions. Candidates then pass the gate.
    pub fn visible_tools(&self, context: &AgentContext) -> Vec<String> {
        let all = self.registry.tool_names();
        let candidates = match context.selected_tools.as_deref() {
            None => all.clone(),
            Some(selected) => {
                let suggested = suggest_for_resources(&context.resources, &all);
                merge_selection(Some(selected), &suggested).unwrap_or_default()
            }
        };
        self.gate
            .filter(&candidates, &context.caller)
            .into_iter()
            .filter(|name| all.contains(name))
            .collect()
    }

    async fn handle_for(&self, server: &str) -> RouterHandle {
        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.get(server) {
            return handle.clone();
        }
        let handle = self.router.register(server).await;
        handles.insert(server.to_string(), handle.clone());
        handle
    }

    async fn invoke(&self, call: &ToolCall, context: &AgentContext) -> Result<ToolResult, ToolError> {
        let gate_server = self.gate.authorize(call, &context.caller)?;

        let resolved = self
            .registry
            .resolve(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        // The declaring server can be shorter than the gate's longest match
        if resolved.server_name != gate_server
            && let GateDecision::Denied { reason } =
                self.gate.check_server(resolved.server_name.clone(), &context.caller)
        {
            self.gate.audit().log(
                AuditEvent::ToolDenied {
                    tool_name: call.name.clone(),
                },
                &context.caller,
                &call.name,
                AuditOutcome::Denied,
                Some(reason.clone()),
            );
            return Err(ToolError::PermissionDenied {
                tool_name: call.name.clone(),
                reason,
            });
        }

        let prepared = arguments::prepare(&resolved.definition, call.arguments.clone(), context);
        for o in &prepared.overrides {
            tracing::debug!(tool = %call.name, field = %o.field, "Bound argument for caller");
            self.gate.audit().log(
                AuditEvent::ArgumentOverridden {
                    tool_name: call.name.clone(),
                    field: o.field.clone(),
                },
                &context.caller,
                &call.name,
                AuditOutcome::Success,
                o.previous.as_ref().map(|p| format!("model supplied {p}")),
            );
        }

        let output = self.run(&resolved, prepared.arguments).await?;
        Ok(normalize(&call.id, output))
    }

    async fn run(&self, resolved: &ResolvedTool, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let tool_name = resolved.definition.name.as_str();
        let mut reply = self
            .with_timeout(tool_name, resolved.server.call_tool(&resolved.tool, arguments.clone()))
            .await?;
        let mut rounds = 0;

        loop {
            let (prompt, schema) = match reply {
                ToolReply::Output(value) => return Ok(value),
                ToolReply::InputRequired { prompt, schema } => (prompt, schema),
            };

            rounds += 1;
            if rounds > MAX_ELICITATION_ROUNDS {
                return Err(ToolError::ExecutionFailed {
                    tool_name: tool_name.to_string(),
                    reason: format!("asked for input more than {MAX_ELICITATION_ROUNDS} times"),
                });
            }

            let handle = self.handle_for(&resolved.server_name).await;
            let request_id = self
                .router
                .request(&handle, prompt, schema)
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: tool_name.to_string(),
                    reason: e.to_string(),
                })?;

            let awaited = self
                .router
                .wait(&request_id, self.elicitation_timeout)
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: tool_name.to_string(),
                    reason: e.to_string(),
                })?;

            let response = match awaited {
                Awaited::TimedOut => {
                    return Err(ToolError::InputNotProvided {
                        tool_name: tool_name.to_string(),
                        kind: ErrorKind::ElicitationTimeout,
                    });
                }
                Awaited::Response(r) if r.action == ElicitationAction::Cancel => {
                    return Err(ToolError::InputNotProvided {
                        tool_name: tool_name.to_string(),
                        kind: ErrorKind::ElicitationCancelled,
                    });
                }
                Awaited::Response(r) => r,
            };

            tracing::debug!(tool = tool_name, request_id = %request_id, action = %response.action, "Resuming tool");
            reply = self
                .with_timeout(
                    tool_name,
                    resolved.server.resume(&resolved.tool, arguments.clone(), response),
                )
                .await?;
        }
    }

    async fn with_timeout<F>(&self, tool_name: &str, call: F) -> Result<ToolReply, ToolError>
    where
        F: Future<Output = Result<ToolReply, ToolError>>,
    {
        match tokio::time::timeout(self.tool_timeout, call).await {
            Ok(reply) => reply,
            Err(_) => Err(ToolError::Timeout {
                tool_name: tool_name.to_string(),
                timeout_secs: self.tool_timeout.as_secs(),
            }),
        }
    }
}

#[async_trait]
impl ToolExecutor for ToolInvoker {
    fn definitions(&self, context: &AgentContext) -> Vec<ToolDefinition> {
        let visible = self.visible_tools(context);
        self.registry
            .definitions()
            .into_iter()
            .filter(|d| visible.contains(&d.name))
            .collect()
    }

    async fn execute(&self, call: &ToolCall, context: &AgentContext) -> ToolResult {
        let started = Instant::now();
        let result = match self.invoke(call, context).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool call failed");
                ToolResult::failure(&call.id, e.kind(), e.to_string())
            }
        };

        if result.error_kind != Some(ErrorKind::AuthorizationDenied) {
            self.gate.audit().log(
                AuditEvent::ToolExecuted {
                    tool_name: call.name.clone(),
                },
                &context.caller,
                &call.name,
                if result.success {
                    AuditOutcome::Success
                } else {
                    AuditOutcome::Failure
                },
                None,
            );
        }

        tracing::info!(
            tool = %call.name,
            call_id = %call.id,
            success = result.success,
            duration_ms = started.elapsed().as_millis() as u64,
            "Tool call finished"
        );
        result
    }

    async fn abort_pending(&self) {
        self.router.cancel_all().await;
    }
}
