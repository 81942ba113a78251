//! Council configuration: membership, chairman, timeout, wins storage.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (`COUNCIL_MODELS`, `COUNCIL_CHAIRMAN`, ...)
//! 2. Values loaded from a TOML file
//! 3. Built-in defaults

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gateway::ModelId;

/// Comma-separated council member override.
const ENV_COUNCIL_MODELS: &str = "COUNCIL_MODELS";
/// Chairman model override.
const ENV_COUNCIL_CHAIRMAN: &str = "COUNCIL_CHAIRMAN";
/// Per-call timeout override, in seconds.
const ENV_COUNCIL_TIMEOUT_SECS: &str = "COUNCIL_TIMEOUT_SECS";
/// Wins file override.
const ENV_COUNCIL_WINS_PATH: &str = "COUNCIL_WINS_PATH";

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_WINS_PATH: &str = "data/wins.json";

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level configuration for a council deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CouncilConfig {
    /// Models that answer in Stage 1 and review in Stage 2.
    pub council_models: Vec<ModelId>,
    /// Model that synthesizes the final answer in Stage 3.
    pub chairman_model: ModelId,
    /// Upper bound on every single gateway call, in seconds.
    pub per_call_timeout_secs: u64,
    /// Where win counts are persisted.
    pub wins_path: PathBuf,
    /// Optional display names keyed by full model id.
    pub friendly_names: HashMap<String, String>,
    /// Fixed shuffle seed for the anonymizer. Production leaves this unset;
    /// tests set it to pin the label permutation.
    pub anonymizer_seed: Option<u64>,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            council_models: vec![
                ModelId::new("openai/gpt-4o"),
                ModelId::new("anthropic/claude-sonnet-4"),
                ModelId::new("google/gemini-2.0-flash-exp:free"),
                ModelId::new("meta-llama/llama-3.3-70b-instruct"),
            ],
            chairman_model: ModelId::new("google/gemini-2.0-flash-exp:free"),
            per_call_timeout_secs: DEFAULT_TIMEOUT_SECS,
            wins_path: PathBuf::from(DEFAULT_WINS_PATH),
            friendly_names: HashMap::new(),
            anonymizer_seed: None,
        }
    }
}

impl CouncilConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load from a TOML file, then apply environment overrides.
    pub fn from_toml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config.with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(models) = std::env::var(ENV_COUNCIL_MODELS) {
            let parsed: Vec<ModelId> = models
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ModelId::new)
                .collect();
            if !parsed.is_empty() {
                self.council_models = parsed;
            }
        }
        if let Ok(chairman) = std::env::var(ENV_COUNCIL_CHAIRMAN) {
            if !chairman.trim().is_empty() {
                self.chairman_model = ModelId::new(chairman.trim());
            }
        }
        if let Ok(secs) = std::env::var(ENV_COUNCIL_TIMEOUT_SECS) {
            if let Ok(secs) = secs.trim().parse::<u64>() {
                self.per_call_timeout_secs = secs;
            }
        }
        if let Ok(path) = std::env::var(ENV_COUNCIL_WINS_PATH) {
            if !path.trim().is_empty() {
                self.wins_path = PathBuf::from(path.trim());
            }
        }
        self
    }

    /// Per-call timeout as a `Duration`.
    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_secs(self.per_call_timeout_secs)
    }

    /// Display name for a model: the configured friendly name, else the
    /// short form of the id.
    pub fn display_name<'a>(&'a self, model: &'a ModelId) -> &'a str {
        self.friendly_names
            .get(model.as_str())
            .map(String::as_str)
            .unwrap_or_else(|| model.short_name())
    }

    /// Validate the config.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.council_models.is_empty() {
            return Err(ConfigError::Invalid(
                "council_models must not be empty".to_string(),
            ));
        }
        if self.chairman_model.as_str().is_empty() {
            return Err(ConfigError::Invalid(
                "chairman_model must not be empty".to_string(),
            ));
        }
        if self.per_call_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "per_call_timeout_secs must be > 0".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for model in &self.council_models {
            if !seen.insert(model) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate council member: {model}"
                )));
            }
        }
        Ok(())
    }
}
