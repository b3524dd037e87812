//! Configuration for pipeline runs.
//!
//! A [`PipelineConfig`] is built once per process and handed by reference to
//! the coordinator and every stage worker.

use crate::errors::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// The sandbox root every artifact lives under.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    /// Maximum delegation attempts per stage.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Capacity of the progress relay queue.
    #[serde(default = "default_relay_capacity")]
    pub relay_capacity: usize,
    /// Caller-side poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum model turns per stage invocation.
    #[serde(default = "default_agent_max_turns")]
    pub agent_max_turns: usize,
    /// Directory holding skill reference documents.
    #[serde(default = "default_skills_dir")]
    pub skills_dir: PathBuf,
    /// Optional directory with `<stage>.md` prompt overrides.
    #[serde(default)]
    pub prompts_dir: Option<PathBuf>,
    /// External program used for document conversion.
    #[serde(default = "default_converter_program")]
    pub converter_program: String,
    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,
    /// Patent search settings.
    #[serde(default)]
    pub search: SearchConfig,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("workspace")
}

fn default_max_attempts() -> u32 {
    5
}

fn default_relay_capacity() -> usize {
    256
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_agent_max_turns() -> usize {
    40
}

fn default_skills_dir() -> PathBuf {
    PathBuf::from("skills")
}

fn default_converter_program() -> String {
    "markitdown".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            max_attempts: default_max_attempts(),
            relay_capacity: default_relay_capacity(),
            poll_interval_ms: default_poll_interval_ms(),
            agent_max_turns: default_agent_max_turns(),
            skills_dir: default_skills_dir(),
            prompts_dir: None,
            converter_program: default_converter_program(),
            model: ModelConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `PATENTFLOW_*` environment overrides.
    pub fn apply_env(mut self) -> Result<Self, PipelineError> {
        if let Ok(root) = std::env::var("PATENTFLOW_WORKSPACE") {
            self.workspace_root = PathBuf::from(root);
        }
        if let Ok(model) = std::env::var("PATENTFLOW_MODEL") {
            self.model = ModelConfig::for_model(&model)?;
        }
        if let Ok(attempts) = std::env::var("PATENTFLOW_MAX_ATTEMPTS") {
            self.max_attempts = attempts.parse().map_err(|_| {
                PipelineError::Config(format!("PATENTFLOW_MAX_ATTEMPTS is not a number: {attempts}"))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_attempts == 0 {
            return Err(PipelineError::Config("max_attempts must be at least 1".to_string()));
        }
        if self.relay_capacity == 0 {
            return Err(PipelineError::Config("relay_capacity must be at least 1".to_string()));
        }
        if self.agent_max_turns == 0 {
            return Err(PipelineError::Config("agent_max_turns must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Sets the workspace root.
    #[must_use]
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Sets the retry ceiling.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the relay queue capacity.
    #[must_use]
    pub fn with_relay_capacity(mut self, capacity: usize) -> Self {
        self.relay_capacity = capacity;
        self
    }

    /// Sets the caller poll interval.
    #[must_use]
    pub fn with_poll_interval_ms(mut self, millis: u64) -> Self {
        self.poll_interval_ms = millis;
        self
    }

    /// Sets the model configuration.
    #[must_use]
    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = model;
        self
    }

    /// Sets the skills directory.
    #[must_use]
    pub fn with_skills_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.skills_dir = dir.into();
        self
    }

    /// Sets the prompt override directory.
    #[must_use]
    pub fn with_prompts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompts_dir = Some(dir.into());
        self
    }

    /// Gets the poll interval as a Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Model vendor speaking the chat-completions protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// DeepSeek.
    DeepSeek,
    /// OpenAI.
    OpenAi,
}

impl Provider {
    /// Default API base URL.
    #[must_use]
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::DeepSeek => "https://api.deepseek.com",
            Self::OpenAi => "https://api.openai.com/v1",
        }
    }

    /// Environment variable holding the API key.
    #[must_use]
    pub fn api_key_env(self) -> &'static str {
        match self {
            Self::DeepSeek => "DEEPSEEK_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }
}

/// Temperature tier a stage runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureTier {
    /// Near-deterministic output.
    Low,
    /// More varied prose.
    High,
}

/// Model settings shared by every stage worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name sent to the provider.
    pub name: String,
    /// The provider.
    pub provider: Provider,
    /// API base URL.
    pub base_url: String,
    /// Temperature for the low tier.
    pub temperature_low: f32,
    /// Temperature for the high tier.
    pub temperature_high: f32,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: f64,
}

fn default_request_timeout() -> f64 {
    300.0
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::deepseek("deepseek-chat")
    }
}

impl ModelConfig {
    fn deepseek(name: &str) -> Self {
        Self {
            name: name.to_string(),
            provider: Provider::DeepSeek,
            base_url: Provider::DeepSeek.default_base_url().to_string(),
            temperature_low: 0.0,
            temperature_high: 1.0,
            request_timeout_secs: default_request_timeout(),
        }
    }

    fn openai(name: &str) -> Self {
        Self {
            name: name.to_string(),
            provider: Provider::OpenAi,
            base_url: Provider::OpenAi.default_base_url().to_string(),
            temperature_low: 0.1,
            temperature_high: 0.3,
            request_timeout_secs: default_request_timeout(),
        }
    }

    /// Builds the configuration for a supported model name.
    pub fn for_model(name: &str) -> Result<Self, PipelineError> {
        match name {
            "deepseek-chat" => Ok(Self::deepseek(name)),
            "gpt-5" | "gpt-5-mini" => Ok(Self::openai(name)),
            other => Err(PipelineError::Config(format!("Unsupported model: {other}"))),
        }
    }

    /// Returns the temperature for a tier.
    #[must_use]
    pub fn temperature(&self, tier: TemperatureTier) -> f32 {
        match tier {
            TemperatureTier::Low => self.temperature_low,
            TemperatureTier::High => self.temperature_high,
        }
    }

    /// Reads the provider API key from the environment.
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        std::env::var(self.provider.api_key_env())
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    /// Gets the request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_secs)
    }
}

/// Patent search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search endpoint.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,
}

fn default_search_endpoint() -> String {
    "https://serpapi.com/search.json".to_string()
}

fn default_search_key_env() -> String {
    "SERPAPI_API_KEY".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            api_key_env: default_search_key_env(),
        }
    }
}

impl SearchConfig {
    /// Reads the search API key, if configured.
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}
