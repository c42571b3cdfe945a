//! HTTP transport for flush delivery
//!
//! Owns the reqwest client, its idle-connection pool and request timeout.
//! Changing the pool size or timeout builds a new client and swaps it in;
//! requests already in flight keep the `Arc` of the client they started on.

use parking_lot::RwLock;
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::StatConfig;
use crate::error::FlushError;
use crate::payload::{self, Pair};
use crate::sink::{FlushFuture, FlushSink};

/// Settings baked into one client instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSettings {
    pub max_idle_per_host: usize,
    pub request_timeout: Duration,
}

impl From<&StatConfig> for TransportSettings {
    fn from(config: &StatConfig) -> Self {
        TransportSettings {
            max_idle_per_host: config.max_idle_per_host,
            request_timeout: config.request_timeout(),
        }
    }
}

struct ClientSlot {
    client: reqwest::Client,
    settings: TransportSettings,
    generation: u64,
}

impl ClientSlot {
    fn build(settings: TransportSettings, generation: u64) -> Result<Self, FlushError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(settings.max_idle_per_host)
            .timeout(settings.request_timeout)
            .build()
            .map_err(FlushError::Build)?;
        Ok(ClientSlot {
            client,
            settings,
            generation,
        })
    }
}

/// POSTs flush payloads to the configured endpoint
pub struct HttpTransport {
    endpoint: RwLock<Option<Arc<str>>>,
    slot: RwLock<Arc<ClientSlot>>,
}

impl HttpTransport {
    /// Build a transport from configuration
    pub fn new(config: &StatConfig) -> Result<Self, FlushError> {
        let slot = ClientSlot::build(TransportSettings::from(config), 0)?;
        Ok(HttpTransport {
            endpoint: RwLock::new(config.endpoint.as_deref().map(Arc::from)),
            slot: RwLock::new(Arc::new(slot)),
        })
    }

    /// Set the destination URL; used from the next flush on
    pub fn set_endpoint(&self, endpoint: impl Into<String>) {
        let endpoint: String = endpoint.into();
        info!(endpoint = %endpoint, "Stat endpoint configured");
        *self.endpoint.write() = Some(Arc::from(endpoint));
    }

    pub fn endpoint(&self) -> Option<String> {
        self.endpoint.read().as_deref().map(str::to_string)
    }

    /// Change the idle pool size, rebuilding the client if it differs
    pub fn set_max_idle_per_host(&self, n: usize) -> Result<(), FlushError> {
        self.rebuild(|settings| settings.max_idle_per_host = n)
    }

    /// Change the request timeout, rebuilding the client if it differs
    pub fn set_request_timeout(&self, timeout: Duration) -> Result<(), FlushError> {
        self.rebuild(|settings| settings.request_timeout = timeout)
    }

    pub fn settings(&self) -> TransportSettings {
        self.slot.read().settings
    }

    /// Number of times the client has been rebuilt
    pub fn generation(&self) -> u64 {
        self.slot.read().generation
    }

    fn rebuild(&self, change: impl FnOnce(&mut TransportSettings)) -> Result<(), FlushError> {
        let mut slot = self.slot.write();
        let mut settings = slot.settings;
        change(&mut settings);
        if settings == slot.settings {
            return Ok(());
        }

        let next = ClientSlot::build(settings, slot.generation + 1)?;
        debug!(
            max_idle_per_host = settings.max_idle_per_host,
            timeout_ms = settings.request_timeout.as_millis() as u64,
            generation = next.generation,
            "Rebuilt stat http client"
        );
        *slot = Arc::new(next);
        Ok(())
    }

    /// Serialize and POST one batch
    pub async fn send(&self, pairs: &[Pair]) -> Result<(), FlushError> {
        let endpoint = self.endpoint.read().clone().ok_or(FlushError::NoEndpoint)?;
        let body = payload::encode(pairs)?;
        // Clone out so a concurrent rebuild cannot affect this request
        let slot = self.slot.read().clone();

        let response = slot
            .client
            .post(&*endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        // Drain the body so the connection goes back to the pool
        let _ = response.bytes().await;

        if !status.is_success() {
            return Err(FlushError::Status(status.as_u16()));
        }
        Ok(())
    }
}

impl FlushSink for HttpTransport {
    fn flush<'a>(&'a self, pairs: &'a [Pair]) -> FlushFuture<'a> {
        Box::pin(self.send(pairs))
    }
}
