pub mod broker;
pub mod file;

pub use broker::BrokerSink;
pub use file::FileSink;

use std::future::Future;

use serde::Serialize;

use crate::config::{ComponentConfig, SinkKind};
use crate::error::SinkError;
use crate::record::StatsRecord;

/// Lifecycle of a sink's destination resource.
///
/// `Closed → Opening → Open → Closed`; a failed open goes straight back to
/// `Closed` and is not retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkState {
    Closed,
    Opening,
    Open,
}

/// Durable destination for [`StatsRecord`]s.
pub trait RecordSink: Send {
    /// Short human-readable target, e.g. the CSV path or broker topic.
    fn describe(&self) -> String;

    fn state(&self) -> SinkState;

    /// Acquire the destination. Failure leaves the sink `Closed`.
    fn open(&mut self) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Persist one record. Must return in bounded time.
    fn write(&mut self, record: &StatsRecord) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Flush and release the destination. Calling it twice is harmless.
    fn close(&mut self) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// The sink selected by configuration.
pub enum SinkHandle {
    File(FileSink),
    Broker(BrokerSink),
}

impl SinkHandle {
    /// Build an unopened sink for `cfg`.
    pub fn from_config(cfg: &ComponentConfig) -> Self {
        match cfg.sink {
            SinkKind::File => Self::File(FileSink::new(&cfg.csv_file_base_name)),
            SinkKind::Broker => Self::Broker(BrokerSink::new(
                &cfg.broker_url,
                &cfg.broker_topic,
                cfg.publish_timeout(),
            )),
        }
    }

    pub fn kind(&self) -> SinkKind {
        match self {
            Self::File(_) => SinkKind::File,
            Self::Broker(_) => SinkKind::Broker,
        }
    }
}

impl RecordSink for SinkHandle {
    fn describe(&self) -> String {
        match self {
            Self::File(s) => s.describe(),
            Self::Broker(s) => s.describe(),
        }
    }

    fn state(&self) -> SinkState {
        match self {
            Self::File(s) => s.state(),
            Self::Broker(s) => s.state(),
        }
    }

    async fn open(&mut self) -> Result<(), SinkError> {
        match self {
            Self::File(s) => s.open().await,
            Self::Broker(s) => s.open().await,
        }
    }

    async fn write(&mut self, record: &StatsRecord) -> Result<(), SinkError> {
        match self {
            Self::File(s) => s.write(record).await,
            Self::Broker(s) => s.write(record).await,
        }
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        match self {
            Self::File(s) => s.close().await,
            Self::Broker(s) => s.close().await,
        }
    }
}
