//! Tool authorization gate: which caller may use which server's tools.
//!
//! A tool named `{server}_{tool}` belongs to the longest configured server
//! name that prefixes it. The caller may use it when the caller's groups
//! intersect the server's groups. Rules:
//! - Server unknown → deny
//! - Server groups contain `"*"` → allow all
//! - Server groups empty → deny all (secure by default)

use std::collections::HashMap;
use std::sync::Arc;

use stepclaw_config::{AppConfig, PUBLIC_GROUP};
use stepclaw_core::{ToolCall, ToolError};

use crate::audit::{AuditEvent, AuditLogger, AuditOutcome};

/// Where group memberships come from.
pub trait GroupSource: Send + Sync {
    /// Groups the caller belongs to.
    fn groups_for_caller(&self, caller: &str) -> Vec<String>;

    /// Groups allowed on a server; `None` when the server is unknown.
    fn groups_for_server(&self, server: &str) -> Option<Vec<String>>;

    /// All known server names.
    fn servers(&self) -> Vec<String>;
}

/// Group memberships fixed at construction, usually from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticGroups {
    users: HashMap<String, Vec<String>>,
    servers: HashMap<String, Vec<String>>,
    default_groups: Vec<String>,
}

impl StaticGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `[servers.*]`, `[users.*]` and `default_groups`.
    /// Disabled servers are left out and therefore denied.
    pub fn from_config(config: &AppConfig) -> Self {
        let servers = config
            .servers
            .iter()
            .filter(|(_, server)| server.enabled)
            .map(|(name, server)| (name.clone(), server.groups.clone()))
            .collect();
        let users = config
            .users
            .iter()
            .map(|(name, user)| (name.clone(), user.groups.clone()))
            .collect();
        Self {
            users,
            servers,
            default_groups: config.default_groups.clone(),
        }
    }

    pub fn with_server(mut self, name: impl Into<String>, groups: &[&str]) -> Self {
        self.servers
            .insert(name.into(), groups.iter().map(|g| g.to_string()).collect());
        self
    }

    pub fn with_user(mut self, name: impl Into<String>, groups: &[&str]) -> Self {
        self.users
            .insert(name.into(), groups.iter().map(|g| g.to_string()).collect());
        self
    }

    pub fn with_default_groups(mut self, groups: &[&str]) -> Self {
        self.default_groups = groups.iter().map(|g| g.to_string()).collect();
        self
    }
}

impl GroupSource for StaticGroups {
    fn groups_for_caller(&self, caller: &str) -> Vec<String> {
        let mut groups = self.default_groups.clone();
        if let Some(own) = self.users.get(caller) {
            groups.extend(own.iter().cloned());
        }
        groups
    }

    fn groups_for_server(&self, server: &str) -> Option<Vec<String>> {
        self.servers.get(server).cloned()
    }

    fn servers(&self) -> Vec<String> {
        self.servers.keys().cloned().collect()
    }
}

/// Result of checking one tool name for one caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allowed { server: String },
    Denied { reason: String },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Decides tool visibility and re-checks every invocation.
pub struct ToolGate {
    source: Arc<dyn GroupSource>,
    audit: Arc<AuditLogger>,
}

impl ToolGate {
    pub fn new(source: Arc<dyn GroupSource>) -> Self {
        Self {
            source,
            audit: Arc::new(AuditLogger::tracing()),
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    /// Longest known server name `S` such that the tool name starts with `S_`.
    pub fn resolve_server(&self, tool_name: &str) -> Option<String> {
        self.source
            .servers()
            .into_iter()
            .filter(|server| {
                tool_name.len() > server.len() + 1
                    && tool_name.starts_with(server.as_str())
                    && tool_name.as_bytes()[server.len()] == b'_'
            })
            .max_by_key(|server| server.len())
    }

    /// Check one tool for one caller. Pure: nothing is audited.
    pub fn check(&self, tool_name: &str, caller: &str) -> GateDecision {
        match self.resolve_server(tool_name) {
            Some(server) => self.check_server(server, caller),
            None => GateDecision::Denied {
                reason: format!("no known server declares '{tool_name}'"),
            },
        }
    }

    /// Check whether the caller may use a server's tools.
    pub fn check_server(&self, server: String, caller: &str) -> GateDecision {
        let server_groups = self.source.groups_for_server(&server).unwrap_or_default();
        if server_groups.is_empty() {
            return GateDecision::Denied {
                reason: format!("server '{server}' has no access groups (deny by default)"),
            };
        }

        if server_groups.iter().any(|g| g == PUBLIC_GROUP) {
            return GateDecision::Allowed { server };
        }

        let caller_groups = self.source.groups_for_caller(caller);
        if server_groups.iter().any(|g| caller_groups.contains(g)) {
            GateDecision::Allowed { server }
        } else {
            GateDecision::Denied {
                reason: format!(
                    "caller '{caller}' is not in any of the groups for server '{server}' ({})",
                    server_groups.join(", ")
                ),
            }
        }
    }

    /// Keep the tools the caller may see, in request order.
    pub fn filter(&self, requested: &[String], caller: &str) -> Vec<String> {
        let allowed: Vec<String> = requested
            .iter()
            .filter(|name| self.check(name, caller).is_allowed())
            .cloned()
            .collect();

        if allowed.len() < requested.len() {
            tracing::debug!(
                caller,
                requested = requested.len(),
                allowed = allowed.len(),
                "Tool list narrowed by authorization gate"
            );
            let removed: Vec<&str> = requested
                .iter()
                .filter(|name| !allowed.contains(*name))
                .map(String::as_str)
                .collect();
            self.audit.log(
                AuditEvent::ToolListFiltered {
                    requested: requested.len(),
                    allowed: allowed.len(),
                },
                caller,
                "tool_list",
                AuditOutcome::Denied,
                Some(format!("removed: {}", removed.join(", "))),
            );
        }

        allowed
    }

    /// Invocation-time re-check. Returns the declaring server on success.
    pub fn authorize(&self, call: &ToolCall, caller: &str) -> Result<String, ToolError> {
        match self.check(&call.name, caller) {
            GateDecision::Allowed { server } => Ok(server),
            GateDecision::Denied { reason } => {
                tracing::warn!(caller, tool = %call.name, %reason, "Tool call denied");
                self.audit.log(
                    AuditEvent::ToolDenied {
                        tool_name: call.name.clone(),
                    },
                    caller,
                    &call.name,
                    AuditOutcome::Denied,
                    Some(reason.clone()),
                );
                Err(ToolError::PermissionDenied {
                    tool_name: call.name.clone(),
                    reason,
                })
            }
        }
    }

    /// Servers whose tools the caller may use, sorted by name.
    pub fn accessible_servers(&self, caller: &str) -> Vec<String> {
        let mut servers: Vec<String> = self
            .source
            .servers()
            .into_iter()
            .filter(|server| self.check_server(server.clone(), caller).is_allowed())
            .collect();
        servers.sort();
        servers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepclaw_core::ErrorKind;

    fn gate() -> ToolGate {
        let groups = StaticGroups::new()
            .with_server("pdfbasic", &["*"])
            .with_server("admin_tools", &["admins"])
            .with_server("admin", &["staff"])
            .with_server("locked", &[])
            .with_user("alice", &["admins"])
            .with_user("sam", &["staff"])
            .with_default_groups(&["everyone"]);
        ToolGate::new(Arc::new(groups)).with_audit(Arc::new(AuditLogger::new()))
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn longest_prefix_wins() {
        let gate = gate();
        assert_eq!(
            gate.resolve_server("admin_tools_delete").as_deref(),
            Some("admin_tools")
        );
        assert_eq!(gate.resolve_server("admin_reboot").as_deref(), Some("admin"));
        assert_eq!(gate.resolve_server("pdfbasic").as_deref(), None);
        assert_eq!(gate.resolve_server("weather_now"), None);
    }

    #[test]
    fn public_server_allows_anyone() {
        let gate = gate();
        assert!(gate.check("pdfbasic_extract_pdf_text", "stranger").is_allowed());
    }

    #[test]
    fn empty_groups_deny_everyone() {
        let gate = gate();
        assert!(!gate.check("locked_open", "alice").is_allowed());
    }

    #[test]
    fn unknown_server_denied() {
        let gate = gate();
        assert!(matches!(
            gate.check("weather_now", "alice"),
            GateDecision::Denied { .. }
        ));
    }

    #[test]
    fn filter_excludes_and_audits() {
        let gate = gate();
        let requested = names(&["pdfbasic_extract_pdf_text", "admin_tools_delete", "admin_reboot"]);
        let allowed = gate.filter(&requested, "sam");
        assert_eq!(allowed, names(&["pdfbasic_extract_pdf_text", "admin_reboot"]));

        let entries = gate.audit().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].event,
            AuditEvent::ToolListFiltered {
                requested: 3,
                allowed: 2
            }
        );
    }

    #[test]
    fn filter_does_not_audit_when_nothing_removed() {
        let gate = gate();
        let requested = names(&["admin_tools_delete"]);
        assert_eq!(gate.filter(&requested, "alice"), requested);
        assert_eq!(gate.audit().count(), 0);
    }

    #[test]
    fn authorize_rejects_injected_tool() {
        let gate = gate();
        let call = ToolCall::new("c1", "admin_tools_delete", serde_json::json!({"id": 3}));
        let err = gate.authorize(&call, "sam").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationDenied);
        assert_eq!(gate.audit().entries_by_outcome(&AuditOutcome::Denied).len(), 1);

        assert_eq!(gate.authorize(&call, "alice").unwrap(), "admin_tools");
    }

    #[test]
    fn accessible_servers_for_caller() {
        let gate = gate();
        assert_eq!(gate.accessible_servers("alice"), names(&["admin_tools", "pdfbasic"]));
        assert_eq!(gate.accessible_servers("nobody"), names(&["pdfbasic"]));
    }

    #[test]
    fn from_config_skips_disabled_servers() {
        let config: AppConfig = toml::from_str(
            r#"
            [servers.pdfbasic]
            groups = ["*"]
            [servers.old]
            groups = ["*"]
            enabled = false
            "#,
        )
        .unwrap();
        let gate = ToolGate::new(Arc::new(StaticGroups::from_config(&config)));
        assert!(gate.check("pdfbasic_merge", "x").is_allowed());
        assert!(!gate.check("old_thing", "x").is_allowed());
    }
}
