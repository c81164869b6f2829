//! `stepclaw config`: Configuration management commands.

use std::collections::HashSet;
use std::path::Path;

use stepclaw_config::{AppConfig, PUBLIC_GROUP};

pub async fn validate(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating {}...", path.display());

    match AppConfig::load_with_env(path) {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Strategy:    {}", config.agent.strategy);
            println!("   Max steps:   {}", config.agent.max_steps);
            println!(
                "   Timeouts:    tool {}s, elicitation {}s",
                config.agent.tool_timeout_secs, config.agent.elicitation_timeout_secs
            );
            println!("   Servers:     {}", config.servers.len());
            println!("   Users:       {}", config.users.len());
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load_with_env(path).map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", path.display());
    Ok(())
}

pub async fn init(path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() && !force {
        return Err(format!("{} already exists (use --force to overwrite)", path.display()).into());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    println!("✅ Wrote default configuration to {}", path.display());
    Ok(())
}

/// Settings that parse but are probably not what was meant.
pub fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    let mut names: Vec<&String> = config.servers.keys().collect();
    names.sort();

    for name in &names {
        let server = &config.servers[*name];
        if server.enabled && server.groups.is_empty() {
            warnings.push(format!("Server '{name}' has no groups and is denied to everyone"));
        }
    }

    let granted: HashSet<&str> = config
        .servers
        .values()
        .flat_map(|s| s.groups.iter().map(String::as_str))
        .collect();
    let mut users: Vec<(&String, _)> = config.users.iter().collect();
    users.sort_by(|a, b| a.0.cmp(b.0));
    for (user, entry) in users {
        for group in &entry.groups {
            if group != PUBLIC_GROUP && !granted.contains(group.as_str()) {
                warnings.push(format!("User '{user}' is in group '{group}' which no server grants"));
            }
        }
    }

    if config.agent.non_action_limit >= config.agent.max_steps {
        warnings.push(format!(
            "non_action_limit ({}) is not below max_steps ({}); the corrective directive can never fire",
            config.agent.non_action_limit, config.agent.max_steps
        ));
    }

    warnings
}
