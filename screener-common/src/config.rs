//! Configuration management for the screener service.
//!
//! The service reads a single JSON file, `~/.stock-screener/config.json` by default
//! (overridable with `SCREENER_CONFIG`). A missing file means defaults.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `SCREENER_HOST` → server.host
//! - `SCREENER_PORT` → server.port
//! - `SCREENER_LOG_LEVEL` → observability.log_level
//! - `SCREENER_LOG_FORMAT` → observability.log_format
//! - `OPENAI_API_KEY` → ai.api_key
//! - `OPENAI_API_BASE` → ai.base_url
//! - `AI_MODEL_NAME` → ai.model_name
//! - `SCREENER_FETCH_DEADLINE_SECS` → data.fetch_deadline_secs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that points at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "SCREENER_CONFIG";

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".stock-screener"),
        |dirs| dirs.home_dir().join(".stock-screener"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => config_dir().join("config.json"),
    }
}

// ============================================================================
// Server Configuration
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins ("*" allows any origin)
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Maximum accepted request body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    /// Socket address string in `host:port` form.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// AI Configuration
// ============================================================================

/// Base settings for the OpenAI-compatible completion endpoint.
///
/// Requests may override any of these per call; the values here are never
/// mutated at runtime.
#[derive(Clone, Serialize, Deserialize)]
pub struct AiSettings {
    /// API key (empty means unconfigured)
    #[serde(default)]
    pub api_key: String,

    /// Base URL, e.g. `https://api.openai.com/v1`
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ai_model")]
    pub model_name: String,

    /// Sampling temperature
    #[serde(default = "default_ai_temperature")]
    pub temperature: f64,

    /// Per-request timeout in seconds
    #[serde(default = "default_ai_timeout")]
    pub timeout_secs: u64,

    /// Directory of `*.json` risk profile overrides
    #[serde(default)]
    pub risk_profiles_dir: Option<PathBuf>,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_ai_base_url(),
            model_name: default_ai_model(),
            temperature: default_ai_temperature(),
            timeout_secs: default_ai_timeout(),
            risk_profiles_dir: None,
        }
    }
}

impl std::fmt::Debug for AiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiSettings")
            .field("api_key", &crate::util::mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model_name", &self.model_name)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .field("risk_profiles_dir", &self.risk_profiles_dir)
            .finish()
    }
}

// ============================================================================
// Data Configuration
// ============================================================================

/// Market data acquisition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Universe used when a screening request names no symbols and the
    /// market listing is unavailable
    #[serde(default = "default_symbols")]
    pub default_symbols: Vec<String>,

    /// Look-back used by screening when no start date is given
    #[serde(default = "default_history_days")]
    pub default_history_days: i64,

    /// Wall-clock bound on one history fetch before synthetic degradation
    #[serde(default = "default_fetch_deadline")]
    pub fetch_deadline_secs: u64,

    /// Per-request timeout for upstream market data HTTP calls
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,

    /// Override for the primary provider's history endpoint
    #[serde(default)]
    pub primary_history_url: Option<String>,

    /// Override for the primary provider's quote endpoint
    #[serde(default)]
    pub primary_quote_url: Option<String>,

    /// Override for the secondary provider endpoint
    #[serde(default)]
    pub secondary_url: Option<String>,

    /// Override for the overseas provider endpoint
    #[serde(default)]
    pub overseas_url: Option<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            default_symbols: default_symbols(),
            default_history_days: default_history_days(),
            fetch_deadline_secs: default_fetch_deadline(),
            provider_timeout_secs: default_provider_timeout(),
            primary_history_url: None,
            primary_quote_url: None,
            secondary_url: None,
            overseas_url: None,
        }
    }
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format ("json" or "pretty")
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration for the screener service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Completion endpoint settings
    #[serde(default)]
    pub ai: AiSettings,

    /// Market data settings
    #[serde(default)]
    pub data: DataConfig,

    /// Logging settings
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unparseable numeric values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SCREENER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("SCREENER_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        if let Some(level) = lookup("SCREENER_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("SCREENER_LOG_FORMAT") {
            self.observability.log_format = format;
        }

        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.ai.api_key = key;
        }
        if let Some(base) = lookup("OPENAI_API_BASE") {
            self.ai.base_url = base;
        }
        if let Some(model) = lookup("AI_MODEL_NAME") {
            self.ai.model_name = model;
        }

        if let Some(secs) = lookup("SCREENER_FETCH_DEADLINE_SECS") {
            if let Ok(s) = secs.parse() {
                self.data.fetch_deadline_secs = s;
            }
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8000
}
fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}
fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}
fn default_ai_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_ai_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_ai_temperature() -> f64 {
    0.1
}
fn default_ai_timeout() -> u64 {
    60
}
fn default_symbols() -> Vec<String> {
    ["sh600000", "sh600036", "sz000001", "sz000858"]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}
fn default_history_days() -> i64 {
    180
}
fn default_fetch_deadline() -> u64 {
    15
}
fn default_provider_timeout() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
