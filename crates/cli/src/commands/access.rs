//! `stepclaw access`: Show what a caller may reach through the gate.

use std::path::Path;
use std::sync::Arc;

use stepclaw_config::AppConfig;
use stepclaw_security::{GateDecision, StaticGroups, ToolGate};

pub async fn run(path: &Path, user: &str, tools: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load_with_env(path)?;
    print!("{}", report(&config, user, tools));
    Ok(())
}

/// Human-readable access report for `user`.
pub fn report(config: &AppConfig, user: &str, tools: &[String]) -> String {
    let gate = ToolGate::new(Arc::new(StaticGroups::from_config(config)));
    let mut out = String::new();

    let groups = config.groups_for_user(user);
    out.push_str(&format!("User:     {user}\n"));
    out.push_str(&format!(
        "Groups:   {}\n",
        if groups.is_empty() {
            "(none)".to_string()
        } else {
            groups.join(", ")
        }
    ));

    let servers = gate.accessible_servers(user);
    out.push_str(&format!("Servers:  {}\n", servers.len()));
    for server in &servers {
        out.push_str(&format!("  - {server}\n"));
    }

    if !tools.is_empty() {
        out.push('\n');
        for tool in tools {
            match gate.check(tool, user) {
                GateDecision::Allowed { server } => {
                    out.push_str(&format!("  ✅ {tool} (server {server})\n"));
                }
                GateDecision::Denied { reason } => {
                    out.push_str(&format!("  ❌ {tool}: {reason}\n"));
                }
            }
        }
    }
    out
}
