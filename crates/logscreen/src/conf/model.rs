//! Model — AnalyzerConfig and related structs.

use serde::{Deserialize, Serialize};

/// Runtime knobs for the log analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Byte ceiling: the parser gives up with `SizeLimit` past this many bytes.
    pub log_size_limit: u64,
    /// Size of a single chunk pushed through the pipe by a source handler.
    pub chunk_size: usize,
    /// Number of chunks the pipe holds before the producer is suspended.
    pub pipe_capacity: usize,
    /// Longest line kept in the carry buffer before it is cut.
    pub max_line_bytes: usize,
    pub parse_timeout_secs: u64,
    pub max_concurrent_parses: usize,
    /// Banned terms shorter than this are refused by the admin surface.
    pub min_term_length: usize,
    /// Upper bound (in chars) of the excerpt shown to moderators.
    pub context_excerpt_chars: usize,
    pub term_store_path: String,
    pub fetch: FetchConfig,
}

/// Settings for remote attachment downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub http_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            log_size_limit: 64 * 1024 * 1024,
            chunk_size: 8 * 1024,
            pipe_capacity: 16,
            max_line_bytes: crate::parser::MAX_LINE_SIZE,
            parse_timeout_secs: 30,
            max_concurrent_parses: 4,
            min_term_length: 4,
            context_excerpt_chars: 256,
            term_store_path: "/var/lib/logscreen/terms.json".to_string(),
            fetch: FetchConfig::default(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: 60,
            user_agent: concat!("logscreen/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl AnalyzerConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.log_size_limit == 0 {
            return Err("log_size_limit must be > 0".to_string());
        }
        if self.chunk_size == 0 {
            return Err("chunk_size must be > 0".to_string());
        }
        if self.pipe_capacity == 0 {
            return Err("pipe_capacity must be > 0".to_string());
        }
        if self.max_line_bytes == 0 {
            return Err("max_line_bytes must be > 0".to_string());
        }
        if self.parse_timeout_secs == 0 {
            return Err("parse_timeout_secs must be > 0".to_string());
        }
        if self.max_concurrent_parses == 0 {
            return Err("max_concurrent_parses must be > 0".to_string());
        }
        if self.context_excerpt_chars == 0 {
            return Err("context_excerpt_chars must be > 0".to_string());
        }
        if self.term_store_path.is_empty() {
            return Err("term_store_path must not be empty".to_string());
        }
        self.fetch.validate()?;
        Ok(())
    }
}

impl FetchConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.http_timeout_secs == 0 {
            return Err("fetch.http_timeout_secs must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Defaults ─────────────────────────────────────────────────

    #[test]
    fn test_default_size_limit_is_64_mib() {
        let cfg = AnalyzerConfig::default();
        assert_eq!(cfg.log_size_limit, 64 * 1024 * 1024);
    }

    #[test]
    fn test_default_pipe_is_bounded() {
        let cfg = AnalyzerConfig::default();
        assert_eq!(cfg.chunk_size, 8192);
        assert_eq!(cfg.pipe_capacity, 16);
    }

    #[test]
    fn test_default_min_term_length() {
        let cfg = AnalyzerConfig::default();
        assert_eq!(cfg.min_term_length, 4);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(AnalyzerConfig::default().validate().is_ok());
    }

    // ── Validation ───────────────────────────────────────────────

    #[test]
    fn test_zero_size_limit_rejected() {
        let cfg = AnalyzerConfig { log_size_limit: 0, ..Default::default() };
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("log_size_limit"));
    }

    #[test]
    fn test_zero_pipe_capacity_rejected() {
        let cfg = AnalyzerConfig { pipe_capacity: 0, ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_http_timeout_rejected() {
        let mut cfg = AnalyzerConfig::default();
        cfg.fetch.http_timeout_secs = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("http_timeout_secs"));
    }

    // ── TOML ─────────────────────────────────────────────────────

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let cfg: AnalyzerConfig = toml::from_str("log_size_limit = 1024\n").unwrap();
        assert_eq!(cfg.log_size_limit, 1024);
        assert_eq!(cfg.chunk_size, 8192);
        assert_eq!(cfg.fetch.http_timeout_secs, 60);
    }

    #[test]
    fn test_nested_fetch_table() {
        let cfg: AnalyzerConfig = toml::from_str("[fetch]\nhttp_timeout_secs = 5\n").unwrap();
        assert_eq!(cfg.fetch.http_timeout_secs, 5);
        assert_eq!(cfg.log_size_limit, 64 * 1024 * 1024);
    }
}
