//! Configuration loading, validation, and management for StepClaw.
//!
//! Loads configuration from `~/.stepclaw/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use stepclaw_core::Strategy;

/// Group name that makes a server visible to every caller.
pub const PUBLIC_GROUP: &str = "*";

/// The root configuration structure.
///
/// Maps directly to `~/.stepclaw/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Groups every caller belongs to, known or not
    #[serde(default)]
    pub default_groups: Vec<String>,

    /// Loop policy
    #[serde(default)]
    pub agent: AgentSettings,

    /// Tool servers by name, with their access groups
    #[serde(default)]
    pub servers: HashMap<String, ServerConfig>,

    /// Known callers and the groups they belong to
    #[serde(default)]
    pub users: HashMap<String, UserConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default)]
    pub strategy: Strategy,

    /// Model calls allowed per run, including the forced final answer
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Consecutive reasoning-only steps before the corrective directive
    #[serde(default = "default_non_action_limit")]
    pub non_action_limit: u32,

    /// Retries after the first failed model call
    #[serde(default = "default_model_retries")]
    pub model_retries: u32,

    /// First retry delay; doubles on each further retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    #[serde(default = "default_elicitation_timeout_secs")]
    pub elicitation_timeout_secs: u64,
}

fn default_max_steps() -> u32 {
    30
}
fn default_non_action_limit() -> u32 {
    3
}
fn default_model_retries() -> u32 {
    2
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_tool_timeout_secs() -> u64 {
    120
}
fn default_elicitation_timeout_secs() -> u64 {
    300
}
fn default_true() -> bool {
    true
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            max_steps: default_max_steps(),
            non_action_limit: default_non_action_limit(),
            model_retries: default_model_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            tool_timeout_secs: default_tool_timeout_secs(),
            elicitation_timeout_secs: default_elicitation_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Groups allowed to use this server's tools. `"*"` means everyone;
    /// an empty list means nobody.
    #[serde(default)]
    pub groups: Vec<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            enabled: true,
            description: None,
        }
    }
}

impl ServerConfig {
    pub fn is_public(&self) -> bool {
        self.groups.iter().any(|g| g == PUBLIC_GROUP)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub groups: Vec<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.stepclaw/config.toml).
    ///
    /// Environment variables override the file:
    /// - `STEPCLAW_STRATEGY` (think_act, react, act)
    /// - `STEPCLAW_MAX_STEPS`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_path())
    }

    /// Load `path`, apply environment overrides, and validate.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply `STEPCLAW_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(strategy) = lookup("STEPCLAW_STRATEGY") {
            self.agent.strategy = strategy
                .parse()
                .map_err(|e: String| ConfigError::ValidationError(format!("STEPCLAW_STRATEGY: {e}")))?;
        }

        if let Some(max_steps) = lookup("STEPCLAW_MAX_STEPS") {
            self.agent.max_steps = max_steps.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "STEPCLAW_MAX_STEPS must be a positive integer, got '{max_steps}'"
                ))
            })?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".stepclaw")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_steps must be at least 1".into(),
            ));
        }

        if self.agent.non_action_limit == 0 {
            return Err(ConfigError::ValidationError(
                "agent.non_action_limit must be at least 1".into(),
            ));
        }

        if self.agent.tool_timeout_secs == 0 || self.agent.elicitation_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tool and elicitation timeouts must be > 0".into(),
            ));
        }

        for name in self.servers.keys() {
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(ConfigError::ValidationError(format!(
                    "server name '{name}' must be non-empty and contain no whitespace"
                )));
            }
        }

        Ok(())
    }

    /// Groups for a caller: their configured groups plus the defaults.
    pub fn groups_for_user(&self, username: &str) -> Vec<String> {
        let mut groups = self.default_groups.clone();
        if let Some(user) = self.users.get(username) {
            for group in &user.groups {
                if !groups.contains(group) {
                    groups.push(group.clone());
                }
            }
        }
        groups
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for stepclaw_core::Error {
    fn from(e: ConfigError) -> Self {
        stepclaw_core::Error::Config {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
default_groups = ["everyone"]

[agent]
strategy = "think_act"
max_steps = 12

[servers.pdfbasic]
groups = ["*"]
description = "PDF utilities"

[servers.admin_tools]
groups = ["admins"]

[users.alice]
groups = ["admins", "everyone"]
"#;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.max_steps, 30);
        assert_eq!(config.agent.non_action_limit, 3);
        assert_eq!(config.agent.model_retries, 2);
        assert_eq!(config.agent.strategy, Strategy::React);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config: AppConfig = toml::from_str(SAMPLE).unwrap();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.agent.max_steps, 12);
        assert_eq!(parsed.servers["admin_tools"].groups, vec!["admins"]);
    }

    #[test]
    fn sample_parses_with_defaults() {
        let config: AppConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.agent.strategy, Strategy::ThinkAct);
        assert_eq!(config.agent.elicitation_timeout_secs, 300);
        assert!(config.servers["pdfbasic"].is_public());
        assert!(config.servers["admin_tools"].enabled);
        assert!(!config.servers["admin_tools"].is_public());
    }

    #[test]
    fn zero_max_steps_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn whitespace_server_name_rejected() {
        let mut config = AppConfig::default();
        config
            .servers
            .insert("bad name".into(), ServerConfig::default());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert!(result.unwrap().servers.is_empty());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.agent.max_steps, 12);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[agent\nmax_steps = ").unwrap();
        assert!(matches!(
            AppConfig::load_from(file.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| match key {
                "STEPCLAW_STRATEGY" => Some("act".into()),
                "STEPCLAW_MAX_STEPS" => Some("7".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.agent.strategy, Strategy::Act);
        assert_eq!(config.agent.max_steps, 7);
    }

    #[test]
    fn bad_env_override_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(|key| (key == "STEPCLAW_MAX_STEPS").then(|| "many".into()))
            .unwrap_err();
        assert!(err.to_string().contains("STEPCLAW_MAX_STEPS"));
    }

    #[test]
    fn user_groups_include_defaults() {
        let config: AppConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.groups_for_user("alice"), vec!["everyone", "admins"]);
        assert_eq!(config.groups_for_user("mallory"), vec!["everyone"]);
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("max_steps = 30"));
        assert!(toml_str.contains("react"));
    }
}
