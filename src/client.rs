//! StatClient - the public façade
//!
//! One `StatClient::start` per process (or per test) spawns exactly one
//! aggregator. Clone the client to share it; clones push into the same
//! aggregator.
//!
//! ```rust,ignore
//! use statclient::{StatClient, StatConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = StatClient::start(StatConfig::from_env())?;
//!     client.configure_endpoint("http://stats.internal/push");
//!
//!     client.push_counter("requests.ok", 1);
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::aggregator::{Aggregator, AggregatorHandle, StatsSnapshot};
use crate::config::StatConfig;
use crate::error::{ConfigError, FlushError};
use crate::payload::Pair;
use crate::transport::HttpTransport;

/// Error returned by `StatClient::start`
#[derive(Debug)]
pub enum StartError {
    Config(ConfigError),
    Transport(FlushError),
}

impl std::fmt::Display for StartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartError::Config(e) => write!(f, "{}", e),
            StartError::Transport(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for StartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StartError::Config(e) => Some(e),
            StartError::Transport(e) => Some(e),
        }
    }
}

impl From<ConfigError> for StartError {
    fn from(e: ConfigError) -> Self {
        StartError::Config(e)
    }
}

impl From<FlushError> for StartError {
    fn from(e: FlushError) -> Self {
        StartError::Transport(e)
    }
}

/// Handle used by callers to report counters
#[derive(Clone)]
pub struct StatClient {
    transport: Arc<HttpTransport>,
    aggregator: AggregatorHandle,
}

impl StatClient {
    /// Build the transport and spawn the aggregator on the current tokio runtime
    pub fn start(config: StatConfig) -> Result<Self, StartError> {
        config.validate()?;
        let transport = Arc::new(HttpTransport::new(&config)?);
        let aggregator = Aggregator::spawn(
            transport.clone(),
            config.flush_interval(),
            config.queue_capacity,
        )?;
        tracing::info!(
            endpoint = ?config.endpoint,
            flush_interval_secs = config.flush_interval_secs,
            queue_capacity = config.queue_capacity,
            "Stat client started"
        );
        Ok(StatClient {
            transport,
            aggregator,
        })
    }

    /// Set the collection endpoint; takes effect on the next flush
    pub fn configure_endpoint(&self, url: impl Into<String>) {
        self.transport.set_endpoint(url);
    }

    /// Set idle connections per host, rebuilding the HTTP client if changed
    pub fn configure_pool(&self, max_idle_per_host: usize) -> Result<(), FlushError> {
        self.transport.set_max_idle_per_host(max_idle_per_host)
    }

    /// Set the request timeout, rebuilding the HTTP client if changed
    pub fn configure_timeout(&self, timeout: Duration) -> Result<(), FlushError> {
        self.transport.set_request_timeout(timeout)
    }

    /// Record an increment. Never blocks; returns `false` if it was dropped.
    #[inline]
    pub fn push_counter(&self, key: impl Into<String>, delta: i64) -> bool {
        self.aggregator.push(key, delta)
    }

    /// Send exactly `pairs` now, bypassing the accumulated counters
    pub async fn flush_immediate(&self, pairs: &[Pair]) -> Result<(), FlushError> {
        self.transport.send(pairs).await
    }

    /// Counters accumulated since the last successful flush
    pub async fn pending(&self) -> Result<Vec<Pair>, FlushError> {
        self.aggregator.pending().await
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.aggregator.stats()
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    /// Merge queued events, flush once more and stop the aggregator
    pub async fn shutdown(&self) {
        self.aggregator.shutdown().await;
    }
}
