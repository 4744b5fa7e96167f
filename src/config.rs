//! Configuration Module
//!
//! Handles loading cache, HTTP and logging settings from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::http::{HttpConfig, RetryConfig};

/// Runtime configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default TTL in seconds for entries stored without explicit TTL
    pub default_ttl: u64,
    /// Background reaper interval in seconds
    pub cleanup_interval: u64,
    /// Directory holding file cache records
    pub cache_dir: PathBuf,
    /// Per-attempt HTTP timeout in seconds
    pub http_timeout: u64,
    /// Total attempts per HTTP request
    pub retry_total: u32,
    /// Backoff factor in seconds between HTTP attempts
    pub retry_backoff: f64,
    /// Log filter used when `RUST_LOG` is not set
    pub log_level: String,
    /// Directory for daily log files, console only when unset
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 3600)
    /// - `CACHE_CLEANUP_INTERVAL` - Reaper frequency in seconds (default: 300)
    /// - `CACHE_DIR` - File cache directory (default: `cache`)
    /// - `HTTP_TIMEOUT` - Per-attempt timeout in seconds (default: 30)
    /// - `HTTP_RETRY_TOTAL` - Attempts per request (default: 3)
    /// - `HTTP_RETRY_BACKOFF` - Backoff factor in seconds (default: 0.3)
    /// - `LOG_LEVEL` - Fallback log filter (default: `info`)
    /// - `LOG_DIR` - Daily log file directory (default: unset)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_ttl: parse_var("CACHE_DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            cleanup_interval: parse_var("CACHE_CLEANUP_INTERVAL")
                .unwrap_or(defaults.cleanup_interval),
            cache_dir: env::var("CACHE_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            http_timeout: parse_var("HTTP_TIMEOUT").unwrap_or(defaults.http_timeout),
            retry_total: parse_var("HTTP_RETRY_TOTAL").unwrap_or(defaults.retry_total),
            retry_backoff: parse_var::<f64>("HTTP_RETRY_BACKOFF")
                .filter(|v| v.is_finite() && *v >= 0.0)
                .unwrap_or(defaults.retry_backoff),
            log_level: env::var("LOG_LEVEL")
                .ok()
                .filter(|v| !v.is_empty())
                .map(|v| v.to_lowercase())
                .unwrap_or(defaults.log_level),
            log_dir: env::var("LOG_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Default TTL as a `Duration`.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl)
    }

    /// Reaper interval as a `Duration`, never zero.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval.max(1))
    }

    /// Retry parameters for the HTTP client.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::default()
            .with_total_attempts(self.retry_total)
            .with_backoff_factor(self.retry_backoff)
    }

    /// HTTP client settings derived from this configuration.
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            timeout: Duration::from_secs(self.http_timeout),
            retry: self.retry_config(),
            ..HttpConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_ttl: 3600,
            cleanup_interval: 300,
            cache_dir: PathBuf::from("cache"),
            http_timeout: 30,
            retry_total: 3,
            retry_backoff: 0.3,
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
