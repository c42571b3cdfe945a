//! Aggregator - Actor-based counter accumulation and periodic flush
//!
//! The aggregator task owns the accumulation map exclusively; callers only
//! ever talk to it through a bounded event queue and a control channel.
//!
//! ```text
//! ┌──────────────┐ try_send  ┌─────────────────────┐  flush   ┌───────────┐
//! │ StatClient(s)│──events──▶│     Aggregator      │─────────▶│ FlushSink │
//! └──────────────┘           │ (owns counter map)  │          └───────────┘
//!                            └─────────────────────┘
//!                                      ▲ tick
//!                                  interval
//! ```
//!
//! Increments and ticks are handled one at a time in a single `select!`
//! loop. A failed flush keeps the map so the next tick sends the old and new
//! deltas together.

use ahash::AHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

use crate::error::{ConfigError, FlushError};
use crate::payload::Pair;
use crate::sink::SharedSink;

/// A single counter increment on its way to the aggregator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterEvent {
    pub key: String,
    pub delta: i64,
}

/// Counters describing the aggregator itself
#[derive(Debug, Default)]
pub struct AggregatorStats {
    merged: AtomicU64,
    dropped: AtomicU64,
    flushes: AtomicU64,
    failed_flushes: AtomicU64,
    skipped_flushes: AtomicU64,
}

/// Point-in-time copy of `AggregatorStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Events merged into the map
    pub merged: u64,
    /// Events rejected because the queue was full or closed
    pub dropped: u64,
    /// Successful flushes
    pub flushes: u64,
    /// Failed flushes (map retained)
    pub failed_flushes: u64,
    /// Ticks that found the map empty
    pub skipped_flushes: u64,
}

impl AggregatorStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            merged: self.merged.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
            skipped_flushes: self.skipped_flushes.load(Ordering::Relaxed),
        }
    }
}

/// Out-of-band requests to the aggregator
#[derive(Debug)]
enum Control {
    /// Copy of the counters not yet flushed
    Pending {
        response: oneshot::Sender<Vec<Pair>>,
    },

    /// Merge what is queued, flush once more and stop
    Shutdown {
        response: oneshot::Sender<()>,
    },
}

/// Handle for communicating with the Aggregator
#[derive(Clone)]
pub struct AggregatorHandle {
    events: mpsc::Sender<CounterEvent>,
    control: mpsc::UnboundedSender<Control>,
    stats: Arc<AggregatorStats>,
}

impl AggregatorHandle {
    /// Enqueue an increment without waiting.
    ///
    /// Returns `false` if the event was dropped because the queue is full
    /// or the aggregator has stopped.
    #[inline]
    pub fn push(&self, key: impl Into<String>, delta: i64) -> bool {
        let event = CounterEvent {
            key: key.into(),
            delta,
        };
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    warn!(dropped, key = %event.key, "Stat queue full, dropping counter");
                }
                false
            }
            Err(TrySendError::Closed(event)) => {
                let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    warn!(dropped, key = %event.key, "Aggregator stopped, dropping counter");
                }
                false
            }
        }
    }

    /// Counters accumulated since the last successful flush.
    ///
    /// Fails with `FlushError::Closed` once the aggregator has stopped.
    pub async fn pending(&self) -> Result<Vec<Pair>, FlushError> {
        let (tx, rx) = oneshot::channel();
        self.control
            .send(Control::Pending { response: tx })
            .map_err(|_| FlushError::Closed)?;
        rx.await.map_err(|_| FlushError::Closed)
    }

    /// Flush once more and stop the aggregator
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.control.send(Control::Shutdown { response: tx }).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

/// The Aggregator owns the counter map exclusively
pub struct Aggregator {
    /// Accumulated deltas since the last successful flush
    counters: AHashMap<String, i64>,
    events: mpsc::Receiver<CounterEvent>,
    control: mpsc::UnboundedReceiver<Control>,
    sink: SharedSink,
    flush_interval: Duration,
    queue_capacity: usize,
    stats: Arc<AggregatorStats>,
}

impl Aggregator {
    /// Create the aggregator, spawn it on the current runtime and return the handle.
    ///
    /// Rejects a zero flush interval or a zero queue capacity.
    pub fn spawn(
        sink: SharedSink,
        flush_interval: Duration,
        queue_capacity: usize,
    ) -> Result<AggregatorHandle, ConfigError> {
        if flush_interval.is_zero() {
            return Err(ConfigError::Invalid("flush interval must be > 0"));
        }
        if queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be > 0"));
        }

        let (events_tx, events_rx) = mpsc::channel(queue_capacity);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(AggregatorStats::default());

        let actor = Aggregator {
            counters: AHashMap::new(),
            events: events_rx,
            control: control_rx,
            sink,
            flush_interval,
            queue_capacity,
            stats: stats.clone(),
        };

        tokio::spawn(async move {
            actor.run().await;
        });

        Ok(AggregatorHandle {
            events: events_tx,
            control: control_tx,
            stats,
        })
    }

    /// Run the actor's event loop
    async fn run(mut self) {
        let mut ticker = interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(event) = self.events.recv() => {
                    self.merge(event);
                }

                _ = ticker.tick() => {
                    self.flush().await;
                }

                msg = self.control.recv() => match msg {
                    Some(Control::Pending { response }) => {
                        self.drain_queued();
                        let _ = response.send(self.snapshot());
                    }
                    Some(Control::Shutdown { response }) => {
                        self.drain_queued();
                        self.flush().await;
                        let _ = response.send(());
                        break;
                    }
                    // Every handle is gone, nothing more can arrive
                    None => {
                        self.drain_queued();
                        self.flush().await;
                        break;
                    }
                },
            }
        }
        debug!("Aggregator stopped");
    }

    fn merge(&mut self, event: CounterEvent) {
        let value = self.counters.entry(event.key).or_insert(0);
        *value = value.saturating_add(event.delta);
        self.stats.merged.fetch_add(1, Ordering::Relaxed);
    }

    /// Merge events already sitting in the queue, at most one queue's worth
    fn drain_queued(&mut self) {
        for _ in 0..self.queue_capacity {
            match self.events.try_recv() {
                Ok(event) => self.merge(event),
                Err(_) => break,
            }
        }
    }

    fn snapshot(&self) -> Vec<Pair> {
        self.counters
            .iter()
            .map(|(key, value)| Pair::new(key.clone(), *value))
            .collect()
    }

    async fn flush(&mut self) {
        if self.counters.is_empty() {
            self.stats.skipped_flushes.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let pairs = self.snapshot();
        match self.sink.flush(&pairs).await {
            Ok(()) => {
                self.counters = AHashMap::new();
                self.stats.flushes.fetch_add(1, Ordering::Relaxed);
                debug!(keys = pairs.len(), "Flushed counters");
            }
            Err(e) => {
                self.stats.failed_flushes.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, keys = pairs.len(), "Flush error, keeping counters for next tick");
            }
        }
    }
}
