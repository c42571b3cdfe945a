//! Client Configuration
//!
//! Settings can come from code (`Default` plus `with_*` builders), from
//! environment variables, or from a TOML file.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `STAT_ENDPOINT` | unset | Collection endpoint URL |
//! | `STAT_MAX_IDLE_PER_HOST` | `10` | Idle connections kept per host |
//! | `STAT_REQUEST_TIMEOUT_MS` | `500` | Per-request deadline |
//! | `STAT_FLUSH_INTERVAL_SECS` | `60` | Seconds between flushes |
//! | `STAT_QUEUE_CAPACITY` | `100000` | Pending events before drops |

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_MAX_IDLE_PER_HOST: usize = 10;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_QUEUE_CAPACITY: usize = 100_000;

/// Stat client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatConfig {
    /// Destination URL for every flush POST
    pub endpoint: Option<String>,
    /// Size of the reusable connection pool per host
    pub max_idle_per_host: usize,
    /// Per-request deadline in milliseconds
    pub request_timeout_ms: u64,
    /// Interval between scheduled flushes in seconds.
    /// Fixed once the client is started.
    pub flush_interval_secs: u64,
    /// Ingress queue capacity. Fixed once the client is started.
    pub queue_capacity: usize,
}

impl Default for StatConfig {
    fn default() -> Self {
        StatConfig {
            endpoint: None,
            max_idle_per_host: DEFAULT_MAX_IDLE_PER_HOST,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl StatConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = StatConfig::default();
        StatConfig {
            endpoint: std::env::var("STAT_ENDPOINT").ok().filter(|s| !s.is_empty()),
            max_idle_per_host: env_parse("STAT_MAX_IDLE_PER_HOST")
                .unwrap_or(defaults.max_idle_per_host),
            request_timeout_ms: env_parse("STAT_REQUEST_TIMEOUT_MS")
                .unwrap_or(defaults.request_timeout_ms),
            flush_interval_secs: env_parse("STAT_FLUSH_INTERVAL_SECS")
                .unwrap_or(defaults.flush_interval_secs),
            queue_capacity: env_parse("STAT_QUEUE_CAPACITY").unwrap_or(defaults.queue_capacity),
        }
    }

    /// Parse configuration from TOML text. Missing fields take defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: StatConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject values the aggregator cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_interval_secs == 0 {
            return Err(ConfigError::Invalid("flush_interval_secs must be > 0"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be > 0"));
        }
        Ok(())
    }

    /// Set the collection endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set idle connections per host
    pub fn with_max_idle_per_host(mut self, n: usize) -> Self {
        self.max_idle_per_host = n;
        self
    }

    /// Set the request timeout. Kept in whole milliseconds, rounded up.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        let millis = timeout.as_millis() + u128::from(timeout.subsec_nanos() % 1_000_000 != 0);
        self.request_timeout_ms = u64::try_from(millis).unwrap_or(u64::MAX);
        self
    }

    /// Set the flush interval. Kept in whole seconds, rounded up, so
    /// `500ms` becomes one second.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_secs =
            interval.as_secs().saturating_add(u64::from(interval.subsec_nanos() != 0));
        self
    }

    /// Set the ingress queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Get flush interval as Duration
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
