use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{FlowlineError, Result};

/// Top-level Flowline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub gateway: Option<GatewayConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path. `~/` is expanded against `$HOME`.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String { "~/.flowline/flowline.db".to_string() }

/// Chat-completion endpoint used by the model invoker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: None,
            base_url: default_base_url(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String { "openai".to_string() }
fn default_model_id() -> String { "qwen-plus".to_string() }
fn default_base_url() -> String { "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string() }
fn default_max_tokens() -> u32 { 1024 }
fn default_temperature() -> f32 { 0.8 }
fn default_timeout_secs() -> u64 { 20 }

/// Workflow execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// System prompt file loaded for every workflow task.
    #[serde(default = "default_system_prompt_path")]
    pub system_prompt_path: String,
    /// Used when a task config carries no `max_tokens`.
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,
    /// Used when a task config carries no `temperature`.
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,
    /// Upper bound on a single task invocation, on top of the HTTP timeout.
    #[serde(default = "default_invoke_timeout_secs")]
    pub invoke_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            system_prompt_path: default_system_prompt_path(),
            default_max_tokens: default_max_tokens(),
            default_temperature: default_temperature(),
            invoke_timeout_secs: default_invoke_timeout_secs(),
        }
    }
}

fn default_system_prompt_path() -> String { "prompts/workflow_prompt.md".to_string() }
fn default_invoke_timeout_secs() -> u64 { 30 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
    /// System prompt file for the direct `/models/invoke` route.
    #[serde(default = "default_invoke_system_prompt_path")]
    pub invoke_system_prompt_path: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            token: None,
            api_keys: vec![],
            invoke_system_prompt_path: default_invoke_system_prompt_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    pub name: String,
    pub key: String,
    #[serde(default)]
    pub role: ApiKeyRole,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyRole {
    /// Read workflows only
    Viewer,
    /// Read + create, update, execute
    #[default]
    Operator,
    /// Full access, including delete
    Admin,
}

fn default_bind() -> String { "127.0.0.1:8000".to_string() }
fn default_invoke_system_prompt_path() -> String { "prompts/prompt.md".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| FlowlineError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| FlowlineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make every model call fail.
    pub fn validate(&self) -> Result<()> {
        if self.engine.invoke_timeout_secs == 0 {
            return Err(FlowlineError::Config(
                "engine.invoke_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.model.timeout_secs == 0 {
            return Err(FlowlineError::Config(
                "model.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.engine.invoke_timeout_secs < self.model.timeout_secs {
            warn!(
                invoke_timeout_secs = self.engine.invoke_timeout_secs,
                http_timeout_secs = self.model.timeout_secs,
                "Engine invoke timeout is shorter than the model HTTP timeout"
            );
        }
        Ok(())
    }

    /// Resolve the database path (expand ~).
    pub fn database_path(&self) -> PathBuf {
        let path = &self.database.path;
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
