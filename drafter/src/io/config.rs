//! Drafter configuration stored in `drafter.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::retry::RetryPolicy;

/// Drafter configuration (TOML).
///
/// Missing fields default to values that work against the hosted
/// chat-completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DrafterConfig {
    /// Maximum steps one `run`/`resume` call may execute before aborting.
    pub max_steps: u32,

    /// Source text beyond this many bytes is truncated before prompting.
    pub code_budget_bytes: usize,

    pub model: ModelConfig,

    pub retry: RetryConfig,

    pub loader: LoaderConfig,
}

impl Default for DrafterConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            code_budget_bytes: 200_000,
            model: ModelConfig::default(),
            retry: RetryConfig::default(),
            loader: LoaderConfig::default(),
        }
    }
}

/// Which text-generation backend to use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum ModelConfig {
    /// OpenAI-compatible `/chat/completions` endpoint.
    Http(HttpModelConfig),
    /// External program: conversation on stdin, reply on stdout.
    Command(CommandModelConfig),
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::Http(HttpModelConfig::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpModelConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Per-request timeout. Unset means wait indefinitely.
    pub timeout_secs: Option<u64>,
}

impl Default for HttpModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            temperature: None,
            max_tokens: None,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommandModelConfig {
    /// Program and arguments (e.g. `["ollama", "run", "llama3.1"]`).
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for CommandModelConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 10 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per model call, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each later attempt.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoaderConfig {
    /// File extensions (without dot) collected when walking a directory.
    pub extensions: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["py".to_string()],
        }
    }
}

impl DrafterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(anyhow!("max_steps must be > 0"));
        }
        if self.code_budget_bytes == 0 {
            return Err(anyhow!("code_budget_bytes must be > 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be > 0"));
        }
        if self.loader.extensions.is_empty() {
            return Err(anyhow!("loader.extensions must not be empty"));
        }
        match &self.model {
            ModelConfig::Http(http) => {
                if http.base_url.trim().is_empty() {
                    return Err(anyhow!("model.base_url must not be empty"));
                }
                if http.model.trim().is_empty() {
                    return Err(anyhow!("model.model must not be empty"));
                }
                if http.timeout_secs == Some(0) {
                    return Err(anyhow!("model.timeout_secs must be > 0"));
                }
            }
            ModelConfig::Command(cmd) => {
                if cmd.command.is_empty() || cmd.command[0].trim().is_empty() {
                    return Err(anyhow!("model.command must be a non-empty array"));
                }
                if cmd.timeout_secs == 0 {
                    return Err(anyhow!("model.timeout_secs must be > 0"));
                }
                if cmd.output_limit_bytes == 0 {
                    return Err(anyhow!("model.output_limit_bytes must be > 0"));
                }
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `DrafterConfig::default()`.
pub fn load_config(path: &Path) -> Result<DrafterConfig> {
    if !path.exists() {
        let cfg = DrafterConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: DrafterConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, DrafterConfig::default());
        assert_eq!(cfg.retry.policy().max_attempts(), 3);
    }

    #[test]
    fn parses_command_backend() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("drafter.toml");
        fs::write(
            &path,
            r#"
max_steps = 40

[model]
backend = "command"
command = ["ollama", "run", "llama3.1"]

[retry]
base_delay_ms = 0

[loader]
extensions = ["rs", "py"]
"#,
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_steps, 40);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.base_delay_ms, 0);
        assert_eq!(cfg.loader.extensions, vec!["rs", "py"]);
        let ModelConfig::Command(cmd) = cfg.model else {
            panic!("expected command backend");
        };
        assert_eq!(cmd.command[0], "ollama");
        assert_eq!(cmd.timeout_secs, 600);
    }

    #[test]
    fn rejects_empty_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("drafter.toml");
        fs::write(&path, "[model]\nbackend = \"command\"\ncommand = []\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("model.command must be a non-empty array"));
    }

    #[test]
    fn rejects_zero_attempts() {
        let cfg = DrafterConfig {
            retry: RetryConfig {
                max_attempts: 0,
                base_delay_ms: 10,
            },
            ..DrafterConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
