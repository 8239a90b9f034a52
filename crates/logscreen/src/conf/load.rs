//! Load — config loading from file and environment variables.

use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use super::model::{AnalyzerConfig, FetchConfig};

const DEFAULT_CONFIG_PATH: &str = "/etc/logscreen/logscreen.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl AnalyzerConfig {
    /// Load configuration from file or environment variables
    /// Priority: Environment Variables > Config File > Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("LOGSCREEN_CONFIG_FILE")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let mut config = if Path::new(&config_path).exists() {
            tracing::info!("Loading configuration from: {}", config_path);
            Self::from_file(&config_path)?
        } else {
            tracing::info!("Config file not found at {}, using environment variables", config_path);
            Self::from_env()
        };

        // Environment variables override file config for critical settings
        if let Some(limit) = env_parse("LOGSCREEN_LOG_SIZE_LIMIT") {
            config.log_size_limit = limit;
        }
        if let Some(timeout) = env_parse("LOGSCREEN_PARSE_TIMEOUT_SECS") {
            config.parse_timeout_secs = timeout;
        }
        if let Ok(path) = std::env::var("LOGSCREEN_TERM_STORE") {
            config.term_store_path = path;
        }

        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AnalyzerConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Self {
        let defaults = AnalyzerConfig::default();
        Self {
            log_size_limit: env_parse("LOGSCREEN_LOG_SIZE_LIMIT").unwrap_or(defaults.log_size_limit),
            chunk_size: env_parse("LOGSCREEN_CHUNK_SIZE").unwrap_or(defaults.chunk_size),
            pipe_capacity: env_parse("LOGSCREEN_PIPE_CAPACITY").unwrap_or(defaults.pipe_capacity),
            max_line_bytes: env_parse("LOGSCREEN_MAX_LINE_BYTES").unwrap_or(defaults.max_line_bytes),
            parse_timeout_secs: env_parse("LOGSCREEN_PARSE_TIMEOUT_SECS")
                .unwrap_or(defaults.parse_timeout_secs),
            max_concurrent_parses: env_parse("LOGSCREEN_MAX_CONCURRENT_PARSES")
                .unwrap_or(defaults.max_concurrent_parses),
            min_term_length: env_parse("LOGSCREEN_MIN_TERM_LENGTH").unwrap_or(defaults.min_term_length),
            context_excerpt_chars: env_parse("LOGSCREEN_CONTEXT_EXCERPT_CHARS")
                .unwrap_or(defaults.context_excerpt_chars),
            term_store_path: std::env::var("LOGSCREEN_TERM_STORE").unwrap_or(defaults.term_store_path),
            fetch: FetchConfig::from_env(),
        }
    }
}

impl FetchConfig {
    /// Load fetch configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = FetchConfig::default();
        Self {
            http_timeout_secs: env_parse("LOGSCREEN_HTTP_TIMEOUT_SECS").unwrap_or(defaults.http_timeout_secs),
            user_agent: std::env::var("LOGSCREEN_USER_AGENT").unwrap_or(defaults.user_agent),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
