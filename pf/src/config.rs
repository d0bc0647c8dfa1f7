//! Configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main planforge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// HTTP server configuration
    pub server: ServerConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Progress stream configuration
    pub stream: StreamConfig,

    /// Completion email configuration
    pub notify: NotifyConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that the provider API key environment variables are set.
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        for (provider, env) in [
            ("OpenAI", &self.llm.openai.api_key_env),
            ("Anthropic", &self.llm.anthropic.api_key_env),
        ] {
            if std::env::var(env).is_err() {
                return Err(eyre::eyre!(
                    "{} API key not found. Set the {} environment variable.",
                    provider,
                    env
                ));
            }
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // An explicit path must load; anything else falls through
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        match Self::find_config_path(None) {
            Some(path) => match Self::load_from_file(&path) {
                Ok(config) => Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                    Ok(Self::default())
                }
            },
            None => {
                tracing::info!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Read just the log level, before logging is initialized
    ///
    /// Runs before `setup_logging`, so failures stay silent and fall back
    /// to the defaults.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let path = Self::find_config_path(config_path)?;
        let content = fs::read_to_string(path).ok()?;
        let config: Config = serde_yaml::from_str(&content).ok()?;
        config.log_level
    }

    /// First existing config file: explicit path, then ./planforge.yml,
    /// then the user config dir
    fn find_config_path(explicit: Option<&PathBuf>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.clone());
        }

        let local = PathBuf::from("planforge.yml");
        if local.exists() {
            return Some(local);
        }

        let user = dirs::config_dir()?.join("planforge").join("planforge.yml");
        user.exists().then_some(user)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration, one block per provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub openai: OpenAiConfig,
    pub anthropic: AnthropicConfig,
}

/// OpenAI-compatible provider (analyst and reviewer calls)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            max_tokens: 4000,
            timeout_ms: 120_000,
        }
    }
}

/// Anthropic-compatible provider (strategist, finalizer and fallback calls)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnthropicConfig {
    /// Model identifier for drafting and fallbacks
    pub model: String,

    /// Model identifier for the finalizer parts
    #[serde(rename = "finalizer-model")]
    pub finalizer_model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per drafting response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Maximum tokens per finalizer response
    #[serde(rename = "finalizer-max-tokens")]
    pub finalizer_max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5-20250929".to_string(),
            finalizer_model: "claude-haiku-4-5-20251001".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 8000,
            finalizer_max_tokens: 4000,
            timeout_ms: 180_000,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the HTTP listener
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "db-path")]
    pub db_path: PathBuf,

    /// Directory with prompt overrides; embedded prompts are used otherwise
    #[serde(rename = "prompts-dir")]
    pub prompts_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // XDG data directory (~/.local/share/planforge on Linux)
        let db_path = dirs::data_dir()
            .map(|d| d.join("planforge"))
            .unwrap_or_else(|| PathBuf::from(".planforge"))
            .join("plans.db");

        Self {
            db_path,
            prompts_dir: None,
        }
    }
}

/// Progress stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Store poll interval for observer streams, in milliseconds
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Watchdog re-read interval for driver streams, in milliseconds
    #[serde(rename = "watch-interval-ms")]
    pub watch_interval_ms: u64,

    /// Observer polls before the stream gives up on a run
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            watch_interval_ms: 1000,
            max_attempts: 120,
        }
    }
}

/// Completion email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Transactional email endpoint (Brevo-compatible)
    #[serde(rename = "api-url")]
    pub api_url: String,

    /// Environment variable containing the API key; unset disables email
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Sender display name
    #[serde(rename = "sender-name")]
    pub sender_name: String,

    /// Sender address
    #[serde(rename = "sender-email")]
    pub sender_email: String,

    /// Public base URL used to build document links in the email
    #[serde(rename = "app-base-url")]
    pub app_base_url: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.brevo.com/v3/smtp/email".to_string(),
            api_key_env: "BREVO_API_KEY".to_string(),
            sender_name: "Planforge".to_string(),
            sender_email: "plans@planforge.local".to_string(),
            app_base_url: "http://127.0.0.1:8787".to_string(),
        }
    }
}
