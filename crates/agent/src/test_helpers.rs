//! Shared test doubles for loop tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use stepclaw_core::{
    AgentContext, ErrorKind, ModelCapability, ModelError, ModelRequest, ModelStep, ToolCall,
    ToolDefinition, ToolExecutor, ToolResult,
};

/// A model that replays scripted replies and records every request.
///
/// Once the script runs out it either repeats a fixed step or fails.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<ModelStep, ModelError>>>,
    repeat: Option<ModelStep>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(steps: Vec<ModelStep>) -> Self {
        Self::with_results(steps.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<ModelStep, ModelError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `step`.
    pub fn repeating(step: ModelStep) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            repeat: Some(step),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelCapability for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_step(&self, request: ModelRequest) -> Result<ModelStep, ModelError> {
        self.requests.lock().unwrap().push(request);
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        match &self.repeat {
            Some(step) => Ok(step.clone()),
            None => Err(ModelError::InvalidResponse("script exhausted".into())),
        }
    }
}

/// A tool executor that answers `result of {tool}` and records calls.
pub struct MockExecutor {
    tools: Vec<String>,
    delay: Option<Duration>,
    fail: bool,
    calls: Mutex<Vec<ToolCall>>,
    aborted: AtomicBool,
}

impl MockExecutor {
    pub fn new(tools: &[&str]) -> Self {
        Self {
            tools: tools.iter().map(|t| t.to_string()).collect(),
            delay: None,
            fail: false,
            calls: Mutex::new(Vec::new()),
            aborted: AtomicBool::new(false),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every call fails with `boom`.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolExecutor for MockExecutor {
    fn definitions(&self, _context: &AgentContext) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|name| ToolDefinition {
                name: name.clone(),
                description: format!("{name} tool"),
                parameters: json!({"type": "object", "properties": {}}),
            })
            .collect()
    }

    async fn execute(&self, call: &ToolCall, _context: &AgentContext) -> ToolResult {
        self.calls.lock().unwrap().push(call.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            ToolResult::failure(&call.id, ErrorKind::ToolInvocationFailed, "boom")
        } else {
            ToolResult::success(&call.id, format!("result of {}", call.name))
        }
    }

    async fn abort_pending(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }
}
