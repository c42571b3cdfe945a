//! Flush Sink Trait
//!
//! The aggregator hands every snapshot to a `FlushSink`:
//! - Production: `HttpTransport` POSTs it to the collection endpoint
//! - Simulation: `SimulatedSink` records it in memory for verification
//!
//! All outbound I/O of the aggregator goes through this trait.

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::FlushError;
use crate::payload::Pair;

/// Boxed future returned by `FlushSink::flush`
pub type FlushFuture<'a> = Pin<Box<dyn Future<Output = Result<(), FlushError>> + Send + 'a>>;

/// Destination for aggregated counter snapshots
pub trait FlushSink: Send + Sync + 'static {
    /// Deliver one batch of pairs. Called at most once at a time per aggregator.
    fn flush<'a>(&'a self, pairs: &'a [Pair]) -> FlushFuture<'a>;
}

/// Arc wrapper for trait object usage
pub type SharedSink = Arc<dyn FlushSink>;

/// In-memory sink for tests and simulation - records every delivered batch
#[derive(Default)]
pub struct SimulatedSink {
    delivered: Mutex<Vec<Vec<Pair>>>,
    failing: AtomicBool,
    attempts: AtomicU64,
}

impl SimulatedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent flushes fail (`true`) or succeed (`false`)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of flush calls, successful or not
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// All successfully delivered batches, oldest first
    pub fn delivered(&self) -> Vec<Vec<Pair>> {
        self.delivered.lock().clone()
    }

    /// Most recent delivered batch, sorted by key
    pub fn last_sorted(&self) -> Option<Vec<Pair>> {
        self.delivered.lock().last().map(|batch| {
            let mut batch = batch.clone();
            batch.sort_by(|a, b| a.key.cmp(&b.key));
            batch
        })
    }
}

impl FlushSink for SimulatedSink {
    fn flush<'a>(&'a self, pairs: &'a [Pair]) -> FlushFuture<'a> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(FlushError::Status(503));
            }
            self.delivered.lock().push(pairs.to_vec());
            Ok(())
        })
    }
}

/// Create a simulated sink for testing
pub fn simulated_sink() -> Arc<SimulatedSink> {
    Arc::new(SimulatedSink::new())
}
