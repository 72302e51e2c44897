//! Experiment configuration loading and validation for Reflace.
//!
//! Loads configuration from `reflace.toml` (or an explicit path) with
//! environment variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "reflace.toml";

/// Which agent strategy drives each task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Plain actor loop, one trial per task
    #[default]
    React,
    /// Actor loop wrapped in evaluate → critique → retry
    Reflexion,
    /// Insight-augmented generator with reflector and curator
    Ace,
    /// Reflection history and insights combined (not implemented)
    Reflace,
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::React => "react",
            Self::Reflexion => "reflexion",
            Self::Ace => "ace",
            Self::Reflace => "reflace",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for AgentKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "react" => Ok(Self::React),
            "reflexion" => Ok(Self::Reflexion),
            "ace" => Ok(Self::Ace),
            "reflace" => Ok(Self::Reflace),
            other => Err(ConfigError::ValidationError(format!(
                "unknown agent '{other}' (expected react, reflexion, ace or reflace)"
            ))),
        }
    }
}

/// The root configuration structure.
///
/// Maps directly to `reflace.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Name used in artifact file names
    #[serde(default = "default_experiment_name")]
    pub experiment_name: String,

    /// Agent strategy
    #[serde(default)]
    pub agent: AgentKind,

    /// Dataset split to draw tasks from
    #[serde(default = "default_dataset")]
    pub dataset: String,

    /// Only run the first K tasks (all when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_k_tasks: Option<usize>,

    /// Directory for trajectories and performance reports
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub actor: ActorConfig,

    #[serde(default)]
    pub reflexion: ReflexionConfig,

    #[serde(default)]
    pub ace: AceConfig,
}

fn default_experiment_name() -> String {
    "SampleExperiment".into()
}
fn default_dataset() -> String {
    "dev".into()
}
fn default_save_dir() -> PathBuf {
    PathBuf::from("results")
}

/// Model client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub name: String,

    #[serde(default)]
    pub temperature: f32,

    /// Attempts per model call, including the first
    #[serde(default = "default_model_retries")]
    pub max_retries: u32,

    /// Base delay between attempts; grows linearly per attempt
    #[serde(default = "default_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_model_retries() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    1000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            temperature: 0.0,
            max_retries: default_model_retries(),
            retry_backoff_ms: default_backoff_ms(),
        }
    }
}

/// Actor loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Model-call rounds per trial
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Substring in an action payload that declares the task done
    #[serde(default = "default_completion_marker")]
    pub completion_marker: String,

    /// Name of the single code-execution tool
    #[serde(default = "default_tool_name")]
    pub tool_name: String,
}

fn default_max_steps() -> usize {
    30
}
fn default_completion_marker() -> String {
    "complete_task".into()
}
fn default_tool_name() -> String {
    "execute_code".into()
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            completion_marker: default_completion_marker(),
            tool_name: default_tool_name(),
        }
    }
}

/// Reflection loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflexionConfig {
    /// Retries after the first trial
    #[serde(default = "default_reflexion_retries")]
    pub max_retries: usize,

    /// Reflections kept; oldest evicted first
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Give the reflector the task's reference solution
    #[serde(default)]
    pub ground_truth: bool,

    /// Tool-using rounds the reflector may spend before its critique
    #[serde(default = "default_reflector_steps")]
    pub reflector_max_steps: usize,
}

fn default_reflexion_retries() -> usize {
    3
}
fn default_max_history() -> usize {
    3
}
fn default_reflector_steps() -> usize {
    10
}

impl Default for ReflexionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_reflexion_retries(),
            max_history: default_max_history(),
            ground_truth: false,
            reflector_max_steps: default_reflector_steps(),
        }
    }
}

/// Insight-accumulation loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AceConfig {
    /// Generator → evaluator → reflector → curator rounds per task
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Cosine similarity at or above which a new insight is a duplicate
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// What to do with a duplicate: "count", "skip" or "overwrite"
    #[serde(default = "default_merge_policy")]
    pub merge_policy: String,

    /// Where the playbook is loaded from and saved to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbook_path: Option<PathBuf>,

    /// Also reflect and curate after successful rounds
    #[serde(default)]
    pub reflect_on_success: bool,
}

fn default_max_rounds() -> usize {
    3
}
fn default_similarity_threshold() -> f32 {
    0.8
}
fn default_merge_policy() -> String {
    "count".into()
}

impl Default for AceConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            similarity_threshold: default_similarity_threshold(),
            merge_policy: default_merge_policy(),
            playbook_path: None,
            reflect_on_success: false,
        }
    }
}

impl ExperimentConfig {
    /// Load configuration from `reflace.toml` in the working directory.
    ///
    /// Environment variable overrides (highest priority):
    /// - `REFLACE_EXPERIMENT`
    /// - `REFLACE_MODEL`
    /// - `REFLACE_SAVE_DIR`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Load `path`, then apply environment overrides and validate.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides();
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

    fn apply_env_overrides(&mut self) {
        if let Ok(name) = std::env::var("REFLACE_EXPERIMENT") {
            self.experiment_name = name;
        }
        if let Ok(model) = std::env::var("REFLACE_MODEL") {
            self.model.name = model;
        }
        if let Ok(dir) = std::env::var("REFLACE_SAVE_DIR") {
            self.save_dir = PathBuf::from(dir);
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.experiment_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "experiment_name must not be empty".into(),
            ));
        }

        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.model.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "model.max_retries must be at least 1".into(),
            ));
        }

        if self.actor.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "actor.max_steps must be at least 1".into(),
            ));
        }

        if self.actor.completion_marker.is_empty() {
            return Err(ConfigError::ValidationError(
                "actor.completion_marker must not be empty".into(),
            ));
        }

        if self.reflexion.max_history == 0 {
            return Err(ConfigError::ValidationError(
                "reflexion.max_history must be at least 1".into(),
            ));
        }

        if self.ace.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "ace.max_rounds must be at least 1".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.ace.similarity_threshold) {
            return Err(ConfigError::ValidationError(
                "ace.similarity_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        if !matches!(
            self.ace.merge_policy.to_ascii_lowercase().as_str(),
            "count" | "skip" | "overwrite"
        ) {
            return Err(ConfigError::ValidationError(format!(
                "ace.merge_policy '{}' must be one of count, skip, overwrite",
                self.ace.merge_policy
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// `trajectories_[<experiment>].json` inside `save_dir`.
    pub fn trajectories_path(&self) -> PathBuf {
        self.save_dir
            .join(format!("trajectories_[{}].json", self.experiment_name))
    }

    /// `performance-report_[<experiment>].json` inside `save_dir`.
    pub fn report_path(&self) -> PathBuf {
        self.save_dir
            .join(format!("performance-report_[{}].json", self.experiment_name))
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            experiment_name: default_experiment_name(),
            agent: AgentKind::default(),
            dataset: default_dataset(),
            first_k_tasks: None,
            save_dir: default_save_dir(),
            model: ModelConfig::default(),
            actor: ActorConfig::default(),
            reflexion: ReflexionConfig::default(),
            ace: AceConfig::default(),
        }
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
