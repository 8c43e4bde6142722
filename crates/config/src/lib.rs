//! Configuration management for cortex
//!
//! Loads and saves the oracle, loop strategy and capability settings.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;

pub use paths::{config_path, data_dir, history_path, turns_dir};

/// Errors in configuration handling
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Reasoning oracle endpoint and sampling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// Optional cheaper model used only for perception judgments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perception_model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: None,
            model: default_model(),
            perception_model: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_model() -> String {
    "google/gemini-2.0-flash-001".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.2
}

/// Budgets and timeouts for the step loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Step budget: full perceive/plan/execute/classify passes per turn
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Retry budget for recoverable faults, separate from the step budget
    #[serde(default = "default_max_lifelines")]
    pub max_lifelines: u32,
    /// Number of ledger records fed to prompts
    #[serde(default = "default_memory_window")]
    pub memory_window: usize,
    #[serde(default = "default_oracle_timeout")]
    pub oracle_timeout_secs: u64,
    #[serde(default = "default_capability_timeout")]
    pub capability_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub reject_duplicate_invocations: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_lifelines: default_max_lifelines(),
            memory_window: default_memory_window(),
            oracle_timeout_secs: default_oracle_timeout(),
            capability_timeout_secs: default_capability_timeout(),
            reject_duplicate_invocations: true,
        }
    }
}

fn default_max_steps() -> u32 {
    5
}

fn default_max_lifelines() -> u32 {
    3
}

fn default_memory_window() -> usize {
    10
}

fn default_oracle_timeout() -> u64 {
    60
}

fn default_capability_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// Web search capability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_max_results() -> u32 {
    5
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            max_results: default_max_results(),
        }
    }
}

/// Web fetch capability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebFetchConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

fn default_max_chars() -> usize {
    8000
}

impl Default for WebFetchConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
        }
    }
}

/// Web capability group configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebCapabilityConfig {
    #[serde(default)]
    pub search: WebSearchConfig,
    #[serde(default)]
    pub fetch: WebFetchConfig,
}

/// Capability registry configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CapabilityConfig {
    /// Groups to register; empty means every built-in group
    #[serde(default)]
    pub enabled_groups: Vec<String>,
    #[serde(default)]
    pub web: WebCapabilityConfig,
}

impl CapabilityConfig {
    pub fn group_enabled(&self, group: &str) -> bool {
        self.enabled_groups.is_empty() || self.enabled_groups.iter().any(|g| g == group)
    }
}

/// Answer history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

fn default_similarity_threshold() -> f64 {
    0.75
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub capabilities: CapabilityConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

impl Config {
    /// Load from the default location
    pub async fn load() -> Result<Self> {
        let path = config_path();
        Self::load_from(&path).await
    }

    /// Load from a specific location, falling back to defaults when absent
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("◆ no config at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        debug!("◆ loading config from {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to the default location
    pub async fn save(&self) -> Result<()> {
        let path = config_path();
        self.save_to(&path).await
    }

    /// Save to a specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("◆ writing config to {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Reject budgets the loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.strategy.max_steps == 0 {
            return Err(ConfigError::Invalid(
                "strategy.max_steps must be at least 1".to_string(),
            ));
        }
        if self.strategy.oracle_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "strategy.oracle_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.strategy.capability_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "strategy.capability_timeout_secs must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.history.similarity_threshold) {
            return Err(ConfigError::Invalid(format!(
                "history.similarity_threshold must be within 0..=1, got {}",
                self.history.similarity_threshold
            )));
        }
        Ok(())
    }

    /// Oracle API key, from config or the environment
    pub fn api_key(&self) -> Option<String> {
        if !self.oracle.api_key.is_empty() {
            return Some(self.oracle.api_key.clone());
        }

        ["OPENROUTER_API_KEY", "OPENAI_API_KEY"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|key| !key.is_empty())
    }

    /// Oracle API base URL
    pub fn api_base(&self) -> Option<String> {
        self.oracle
            .api_base
            .as_ref()
            .filter(|base| !base.is_empty())
            .cloned()
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    /// Model used for planning
    pub fn default_model(&self) -> String {
        self.oracle.model.clone()
    }

    /// Model used for perception; the planning model unless overridden
    pub fn perception_model(&self) -> String {
        self.oracle
            .perception_model
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.oracle.model.clone())
    }

    /// Brave search key, from config or `BRAVE_API_KEY`
    pub fn search_api_key(&self) -> Option<String> {
        let key = &self.capabilities.web.search.api_key;
        if !key.is_empty() {
            return Some(key.clone());
        }
        std::env::var("BRAVE_API_KEY").ok().filter(|k| !k.is_empty())
    }
}

/// Write a default config if none exists and return the effective config
pub async fn init() -> Result<Config> {
    let config_path = config_path();

    if config_path.exists() {
        warn!("◆ config already present at {:?}", config_path);
    } else {
        let config = Config::default();
        config.save().await?;
        info!("◆ config created at {:?}", config_path);
    }

    paths::ensure_dir(&turns_dir()).await?;

    Config::load().await
}
