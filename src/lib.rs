//! Periodic per-link port statistics recorder.
//!
//! A [`Supervisor`] drives a [`PollingScheduler`] that runs a
//! [`SnapshotCollector`] on a fixed interval: every tick enumerates the
//! active links of a [`CounterSource`], turns each link's delta counters into
//! a [`StatsRecord`] and hands it to the configured [`RecordSink`] (CSV file
//! or Redis pub/sub).

pub mod collector;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod record;
pub mod scheduler;
pub mod server;
pub mod sink;
pub mod source;
pub mod supervisor;

pub use collector::{SnapshotCollector, TickReport};
pub use config::{ComponentConfig, Properties, SinkKind};
pub use error::{ConfigError, MonitorError, SchedulerError, SinkError};
pub use record::{StatsRecord, CSV_HEADER};
pub use scheduler::{PollTask, PollingScheduler};
pub use sink::{BrokerSink, FileSink, RecordSink, SinkHandle, SinkState};
pub use source::{ConnectPoint, CounterSource, LinkRef, PortCounters, SimulatedTopology};
pub use supervisor::{MonitorStatus, Supervisor};

use std::sync::Arc;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Owns the scheduler and sink; every control route goes through it.
    pub supervisor: Supervisor,

    /// Tick statistics, also held by the collector.
    pub metrics: Arc<metrics::MonitorMetrics>,
}
