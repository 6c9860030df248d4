//! Runtime configuration loading.
//!
//! Loads intake configuration from `./intake.toml` (or `$INTAKE_CONFIG_PATH`).
//! Environment variables override file values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.
//!
//! Gate strategies are a separate validated document; see [`strategy`].

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

pub mod strategy;

/// Top-level intake configuration loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Runtime settings.
    pub runtime: RuntimeConfig,
    /// Filesystem paths for persistent state.
    pub paths: PathsConfig,
    /// Model endpoint configuration for extraction and planning.
    pub model: ModelConfig,
    /// Profile enrichment service configuration.
    pub profile: ProfileConfig,
    /// Dialogue policy knobs.
    pub dialogue: DialogueConfig,
}

impl IntakeConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Config file path: `$INTAKE_CONFIG_PATH` or `./intake.toml`. A
    /// missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML string into config (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error on invalid TOML.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: IntakeConfig =
            toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let path = Self::config_path_with(|key| std::env::var(key).ok());
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                let config: IntakeConfig =
                    toml::from_str(&contents).context("failed to parse config TOML")?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(IntakeConfig::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    /// Resolve config path using a custom env resolver (for testing).
    fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        if let Some(p) = env("INTAKE_CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("intake.toml")
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability.
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("INTAKE_LOG_LEVEL") {
            self.runtime.log_level = v;
        }

        if let Some(v) = env("INTAKE_STATE_DB") {
            self.paths.state_db = v;
        }
        if let Some(v) = env("INTAKE_STRATEGIES_FILE") {
            self.paths.strategies_file = v;
        }
        if let Some(v) = env("INTAKE_LOGS_DIR") {
            self.paths.logs_dir = v;
        }

        if let Some(v) = env("INTAKE_MODEL_URL") {
            self.model.base_url = v;
        }
        if let Some(v) = env("INTAKE_MODEL") {
            self.model.model = v;
        }
        if let Some(v) = env("INTAKE_MODEL_API_KEY") {
            self.model.api_key = Some(v);
        }
        if let Some(v) = env("INTAKE_MODEL_TIMEOUT_SECS") {
            match v.parse() {
                Ok(n) => self.model.timeout_seconds = n,
                Err(_) => tracing::warn!(
                    var = "INTAKE_MODEL_TIMEOUT_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }

        if let Some(v) = env("INTAKE_PROFILE_URL") {
            self.profile.base_url = Some(v);
        }
        if let Some(v) = env("INTAKE_PROFILE_TIMEOUT_SECS") {
            match v.parse() {
                Ok(n) => self.profile.timeout_seconds = n,
                Err(_) => tracing::warn!(
                    var = "INTAKE_PROFILE_TIMEOUT_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }

        if let Some(v) = env("INTAKE_EDIT_RESUME_POLICY") {
            match v.as_str() {
                "resume-last-gap" => self.dialogue.edit_resume_policy = EditResumePolicy::ResumeLastGap,
                "restart-from-top" => {
                    self.dialogue.edit_resume_policy = EditResumePolicy::RestartFromTop;
                }
                _ => tracing::warn!(
                    var = "INTAKE_EDIT_RESUME_POLICY",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
    }
}

/// Runtime settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Tracing log level filter.
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
        }
    }
}

/// Filesystem paths for persistent state.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// SQLite database for session state.
    pub state_db: String,
    /// Gate strategy document.
    pub strategies_file: String,
    /// Directory for rotated JSON logs (production mode).
    pub logs_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_db: "intake.db".to_owned(),
            strategies_file: "strategies.toml".to_owned(),
            logs_dir: "logs".to_owned(),
        }
    }
}

/// Model endpoint configuration (OpenAI-compatible chat API).
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// API base URL.
    pub base_url: String,
    /// Model name.
    pub model: String,
    /// Optional API key.
    pub api_key: Option<String>,
    /// Bounded timeout for every model call, in seconds.
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_owned(),
            model: "llama3".to_owned(),
            api_key: None,
            timeout_seconds: 30,
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "__REDACTED__"))
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

/// Profile enrichment service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Lookup service base URL. Enrichment resolves nothing when unset.
    pub base_url: Option<String>,
    /// Bounded timeout per view fetch, in seconds.
    pub timeout_seconds: u64,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_seconds: 10,
        }
    }
}

/// Dialogue policy knobs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    /// What the edit path returns to after the user declines the
    /// confirmation summary.
    pub edit_resume_policy: EditResumePolicy,
}

/// Where an edit sub-dialogue resumes.
///
/// This is a product decision, not an inference; callers pick one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EditResumePolicy {
    /// Reuse the last-known gap; fall back to the first unanswered
    /// required gate, then to the first gate in order.
    #[default]
    ResumeLastGap,
    /// Always restart from the first gate in `gate_order`.
    RestartFromTop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = IntakeConfig::default();

        assert_eq!(config.runtime.log_level, "info");
        assert_eq!(config.paths.state_db, "intake.db");
        assert_eq!(config.paths.strategies_file, "strategies.toml");
        assert_eq!(config.model.base_url, "http://localhost:11434");
        assert_eq!(config.model.model, "llama3");
        assert!(config.model.api_key.is_none());
        assert_eq!(config.model.timeout_seconds, 30);
        assert!(config.profile.base_url.is_none());
        assert_eq!(config.profile.timeout_seconds, 10);
        assert_eq!(
            config.dialogue.edit_resume_policy,
            EditResumePolicy::ResumeLastGap
        );
    }

    #[test]
    fn parse_full_toml() {
        let toml_str = r#"
[runtime]
log_level = "debug"

[paths]
state_db = "/var/lib/intake/state.db"
strategies_file = "/etc/intake/strategies.toml"
logs_dir = "/var/log/intake"

[model]
base_url = "https://api.example.com"
model = "gpt-4o-mini"
api_key = "sk-test"
timeout_seconds = 10

[dialogue]
edit_resume_policy = "restart-from-top"
"#;

        let config = IntakeConfig::from_toml(toml_str).expect("should parse");
        assert_eq!(config.runtime.log_level, "debug");
        assert_eq!(config.paths.state_db, "/var/lib/intake/state.db");
        assert_eq!(config.model.model, "gpt-4o-mini");
        assert_eq!(config.model.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model.timeout_seconds, 10);
        assert_eq!(
            config.dialogue.edit_resume_policy,
            EditResumePolicy::RestartFromTop
        );
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config = IntakeConfig::from_toml("[runtime]\nlog_level = \"warn\"\n")
            .expect("should parse");
        assert_eq!(config.runtime.log_level, "warn");
        assert_eq!(config.paths.state_db, "intake.db");
        assert_eq!(config.model.timeout_seconds, 30);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = IntakeConfig::from_toml("[model]\nmodel = \"from-file\"\n")
            .expect("should parse");

        let env = |key: &str| -> Option<String> {
            match key {
                "INTAKE_MODEL" => Some("from-env".to_owned()),
                "INTAKE_MODEL_TIMEOUT_SECS" => Some("5".to_owned()),
                "INTAKE_PROFILE_URL" => Some("http://profiles.internal".to_owned()),
                "INTAKE_EDIT_RESUME_POLICY" => Some("restart-from-top".to_owned()),
                _ => None,
            }
        };
        config.apply_overrides(env);

        assert_eq!(config.model.model, "from-env");
        assert_eq!(config.model.timeout_seconds, 5);
        assert_eq!(
            config.profile.base_url.as_deref(),
            Some("http://profiles.internal")
        );
        assert_eq!(
            config.dialogue.edit_resume_policy,
            EditResumePolicy::RestartFromTop
        );
    }

    #[test]
    fn invalid_env_override_is_ignored() {
        let mut config = IntakeConfig::default();
        config.apply_overrides(|key| match key {
            "INTAKE_MODEL_TIMEOUT_SECS" => Some("not-a-number".to_owned()),
            "INTAKE_EDIT_RESUME_POLICY" => Some("bogus".to_owned()),
            _ => None,
        });
        assert_eq!(config.model.timeout_seconds, 30);
        assert_eq!(
            config.dialogue.edit_resume_policy,
            EditResumePolicy::ResumeLastGap
        );
    }

    #[test]
    fn config_path_uses_env_var() {
        let path = IntakeConfig::config_path_with(|key| match key {
            "INTAKE_CONFIG_PATH" => Some("/custom/intake.toml".to_owned()),
            _ => None,
        });
        assert_eq!(path, PathBuf::from("/custom/intake.toml"));
    }

    #[test]
    fn config_path_defaults_to_cwd() {
        let path = IntakeConfig::config_path_with(|_| None);
        assert_eq!(path, PathBuf::from("intake.toml"));
    }

    #[test]
    fn model_debug_redacts_api_key() {
        let config = ModelConfig {
            api_key: Some("sk-secret".to_owned()),
            ..ModelConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("__REDACTED__"));
    }
}
