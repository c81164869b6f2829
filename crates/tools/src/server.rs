//! Tool server contract.
//!
//! A tool server is an external process (or anything else) that declares a
//! set of tools and executes them by name. Servers are opaque to the core:
//! they return a raw JSON output, or ask for user input mid-call.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use stepclaw_core::{ElicitationResponse, InputSchema, ToolDefinition, ToolError};

/// What a server sent back for one call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolReply {
    /// The tool finished; the raw output is normalized by the invoker.
    Output(serde_json::Value),

    /// The tool needs structured input from the user before it can finish.
    InputRequired { prompt: String, schema: InputSchema },
}

/// Out-of-band messages a server pushes on its own connection.
#[derive(Debug)]
pub enum ServerNotification {
    /// The server wants user input; the answer goes back on `respond_to`.
    ElicitationRequested {
        prompt: String,
        schema: InputSchema,
        respond_to: oneshot::Sender<ElicitationResponse>,
    },
}

/// A connection to one tool server.
#[async_trait]
pub trait ToolServer: Send + Sync {
    /// Server name; tools are exposed to the model as `{name}_{tool}`.
    fn name(&self) -> &str;

    /// The tools this server declares, with unprefixed names.
    fn tools(&self) -> Vec<ToolDefinition>;

    /// Invoke one tool.
    async fn call_tool(
        &self,
        tool: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolReply, ToolError>;

    /// Continue a call that returned [`ToolReply::InputRequired`].
    async fn resume(
        &self,
        tool: &str,
        _arguments: serde_json::Value,
        _response: ElicitationResponse,
    ) -> Result<ToolReply, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: tool.to_string(),
            reason: format!("server '{}' cannot resume calls", self.name()),
        })
    }

    /// Hand over the server's notification feed, once. Servers without
    /// out-of-band messages return `None`.
    fn take_notifications(&self) -> Option<mpsc::Receiver<ServerNotification>> {
        None
    }
}
