//! Configuration Module
//!
//! Handles loading and managing engine and server configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};

// == Corruption Policy ==
/// What recovery does with a log line it cannot decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptionPolicy {
    /// Abort startup with `CorruptRecord`
    Strict,
    /// Log the loss and continue with the next line
    #[default]
    Skip,
}

impl FromStr for CorruptionPolicy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(CorruptionPolicy::Strict),
            "skip" | "lenient" => Ok(CorruptionPolicy::Skip),
            other => Err(CacheError::InvalidRequest(format!(
                "Unknown corruption policy '{}'",
                other
            ))),
        }
    }
}

/// Engine and server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of entries the cache can hold
    pub max_entries: usize,
    /// Path of the durable log file
    pub log_path: PathBuf,
    /// Period of the background expiration sweep
    pub sweep_interval: Duration,
    /// Maximum removals per lock acquisition during a sweep
    pub sweep_batch_size: usize,
    /// TTL applied when a caller does not pass one, None = never expire
    pub default_ttl: Option<Duration>,
    /// Handling of undecodable records during recovery
    pub corruption_policy: CorruptionPolicy,
    /// HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_ENTRIES` - Maximum cache entries (default: 1000)
    /// - `LOG_PATH` - Durable log file (default: data/cache.aof)
    /// - `SWEEP_INTERVAL_MS` - Sweep period in milliseconds (default: 1000)
    /// - `SWEEP_BATCH_SIZE` - Removals per lock acquisition (default: 128)
    /// - `DEFAULT_TTL` - Default TTL in seconds, 0 = never (default: 0)
    /// - `CORRUPTION_POLICY` - `strict` or `skip` (default: skip)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entries: parse_var("MAX_ENTRIES").unwrap_or(defaults.max_entries),
            log_path: env::var("LOG_PATH")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.log_path),
            sweep_interval: parse_var("SWEEP_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.sweep_interval),
            sweep_batch_size: parse_var("SWEEP_BATCH_SIZE").unwrap_or(defaults.sweep_batch_size),
            default_ttl: parse_var::<u64>("DEFAULT_TTL")
                .map(|secs| Some(Duration::from_secs(secs)).filter(|d| !d.is_zero()))
                .unwrap_or(defaults.default_ttl),
            corruption_policy: parse_var("CORRUPTION_POLICY").unwrap_or(defaults.corruption_policy),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
        }
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(CacheError::InvalidRequest(
                "max_entries must be at least 1".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(CacheError::InvalidRequest(
                "sweep_interval must be non-zero".to_string(),
            ));
        }
        if self.sweep_batch_size == 0 {
            return Err(CacheError::InvalidRequest(
                "sweep_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Default configuration writing its log to `log_path`.
    pub fn with_log_path(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            ..Self::default()
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            log_path: PathBuf::from("data/cache.aof"),
            sweep_interval: Duration::from_millis(1000),
            sweep_batch_size: 128,
            default_ttl: None,
            corruption_policy: CorruptionPolicy::Skip,
            server_port: 3000,
        }
    }
}
