use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by a [`RecordSink`](crate::sink::RecordSink).
#[derive(Debug, Error)]
pub enum SinkError {
    /// Destination never opened (or failed to open). Records are dropped.
    #[error("{0} is not open")]
    Unavailable(String),

    /// `write` was called after an explicit `close`.
    #[error("{0} was shut down")]
    ShutDown(String),

    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("write to {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("broker error: {0}")]
    Broker(#[from] redis::RedisError),

    #[error("broker did not answer within {0} ms")]
    Timeout(u64),

    #[error("cannot encode broker message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Contract violations on the scheduler lifecycle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("polling scheduler is already running")]
    AlreadyRunning,

    #[error("polling interval must be greater than zero")]
    ZeroInterval,
}

/// Errors that escape a tick or a lifecycle hook.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("record written after sink shutdown: {0}")]
    WriteAfterShutdown(String),
}

/// A configuration property that could not be applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("property `{key}` has invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Failure to read a CSV row back into a record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordParseError {
    #[error("expected {expected} columns, found {found}")]
    ColumnCount { expected: usize, found: usize },

    #[error("column `{column}` is not a valid value: {value:?}")]
    Column { column: &'static str, value: String },
}
