use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main configuration structure for todo_assistant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Language model configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Todo database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Console display configuration
    #[serde(default)]
    pub ui: UIConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Active provider ("gemini", "ollama" or "local")
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Seconds to wait for a single model reply
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra attempts after a failed or timed out call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between attempts, multiplied by the attempt number
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound on operations run for a single user message
    #[serde(default = "default_max_actions_per_turn")]
    pub max_actions_per_turn: usize,

    /// Send observations back to the model so it can phrase the answer
    #[serde(default = "default_feed_observations")]
    pub feed_observations: bool,

    /// Gemini configuration
    pub gemini: Option<ProviderConfig>,

    /// Ollama configuration
    pub ollama: Option<ProviderConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Model to use
    pub model: Option<String>,

    /// Temperature setting
    pub temperature: Option<f32>,

    /// Override for the API base URL
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite path, or ":memory:"
    #[serde(default = "default_database_url")]
    pub url: String,

    /// How long to wait on a locked database
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UIConfig {
    /// Enable colorful output
    #[serde(default = "default_colorful")]
    pub colorful: bool,

    /// Print the unprocessed model reply before acting on it
    #[serde(default)]
    pub show_raw_replies: bool,
}

// Default value functions
fn default_provider() -> String { "gemini".to_string() }
fn default_timeout_secs() -> u64 { 30 }
fn default_max_retries() -> u32 { 2 }
fn default_retry_backoff_ms() -> u64 { 500 }
fn default_max_actions_per_turn() -> usize { 3 }
fn default_feed_observations() -> bool { true }
fn default_database_url() -> String { "todos.db".to_string() }
fn default_busy_timeout_ms() -> u64 { 5_000 }
fn default_colorful() -> bool { true }

impl Default for LLMConfig {
    fn default() -> Self {
        LLMConfig {
            provider: default_provider(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_actions_per_turn: default_max_actions_per_turn(),
            feed_observations: default_feed_observations(),
            gemini: Some(ProviderConfig {
                model: Some("gemini-1.5-flash".to_string()),
                temperature: Some(0.2),
                base_url: None,
            }),
            ollama: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            url: default_database_url(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for UIConfig {
    fn default() -> Self {
        UIConfig {
            colorful: default_colorful(),
            show_raw_replies: false,
        }
    }
}

impl LLMConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))
    }

    /// Load configuration from command line argument or default locations
    pub fn load(config_path: &Option<String>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::from_file(&*shellexpand::tilde(path));
        }

        let default_paths = [
            "todo_assistant.toml",
            ".todo_assistant.toml",
            "~/.config/todo_assistant/config.toml",
        ];

        for path in default_paths {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(&*expanded_path).exists() {
                match Self::from_file(&*expanded_path) {
                    Ok(config) => return Ok(config),
                    Err(e) => log::warn!("Failed to load config from {}: {:#}", path, e),
                }
            }
        }

        Ok(Self::default())
    }

    /// Apply environment overrides (`DATABASE_URL`)
    pub fn merge_with_env(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                self.database.url = url;
            }
        }
    }

    /// Merge with command-line arguments (CLI args take precedence)
    pub fn merge_with_args(
        &mut self,
        provider: Option<&str>,
        database: Option<&str>,
        no_color: bool,
    ) {
        if let Some(provider) = provider {
            self.llm.provider = provider.to_string();
        }
        if let Some(database) = database {
            self.database.url = database.to_string();
        }
        if no_color {
            self.ui.colorful = false;
        }
    }
}
