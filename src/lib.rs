pub mod aggregator;
pub mod client;
pub mod config;
pub mod error;
pub mod observability;
pub mod payload;
pub mod sink;
pub mod transport;

pub use aggregator::{Aggregator, AggregatorHandle, CounterEvent, StatsSnapshot};
pub use client::{StartError, StatClient};
pub use config::StatConfig;
pub use error::{ConfigError, FlushError};
pub use payload::Pair;
pub use sink::{FlushSink, SharedSink, SimulatedSink};
pub use transport::HttpTransport;
