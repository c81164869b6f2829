//! Server registry: the set of connected tool servers and their tools.

use std::collections::HashMap;
use std::sync::Arc;

use stepclaw_core::ToolDefinition;

use crate::server::ToolServer;

struct RegisteredServer {
    server: Arc<dyn ToolServer>,
    /// Unprefixed definitions, captured at registration
    tools: Vec<ToolDefinition>,
}

/// A namespaced tool name resolved to its server.
#[derive(Clone)]
pub struct ResolvedTool {
    pub server: Arc<dyn ToolServer>,
    pub server_name: String,
    /// Name the server knows the tool by
    pub tool: String,
    /// Definition with the namespaced name
    pub definition: ToolDefinition,
}

impl std::fmt::Debug for ResolvedTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedTool")
            .field("server_name", &self.server_name)
            .field("tool", &self.tool)
            .finish()
    }
}

/// Connected tool servers, keyed by name.
pub struct ServerRegistry {
    servers: HashMap<String, RegisteredServer>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self {
            servers: HashMap::new(),
        }
    }

    /// Register a server. Replaces any existing server with the same name.
    pub fn register(&mut self, server: Arc<dyn ToolServer>) {
        let name = server.name().to_string();
        let tools = server.tools();
        tracing::debug!(server = %name, tools = tools.len(), "Registered tool server");
        self.servers.insert(name, RegisteredServer { server, tools });
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolServer>> {
        self.servers.get(name).map(|s| s.server.clone())
    }

    /// Server names, sorted.
    pub fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.servers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every tool as the model sees it (`{server}_{tool}`), sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .servers
            .iter()
            .flat_map(|(server, entry)| entry.tools.iter().map(move |t| namespaced(server, t)))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Namespaced names of every tool, sorted.
    pub fn tool_names(&self) -> Vec<String> {
        self.definitions().into_iter().map(|d| d.name).collect()
    }

    /// Resolve `{server}_{tool}`, preferring the longest matching server name.
    pub fn resolve(&self, name: &str) -> Option<ResolvedTool> {
        self.servers
            .iter()
            .filter_map(|(server_name, entry)| {
                let tool = name.strip_prefix(server_name.as_str())?.strip_prefix('_')?;
                let def = entry.tools.iter().find(|t| t.name == tool)?;
                Some(ResolvedTool {
                    server: entry.server.clone(),
                    server_name: server_name.clone(),
                    tool: tool.to_string(),
                    definition: namespaced(server_name, def),
                })
            })
            .max_by_key(|resolved| resolved.server_name.len())
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn namespaced(server: &str, tool: &ToolDefinition) -> ToolDefinition {
    ToolDefinition {
        name: format!("{server}_{}", tool.name),
        description: tool.description.clone(),
        parameters: tool.parameters.clone(),
    }
}
