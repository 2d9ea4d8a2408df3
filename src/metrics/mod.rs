pub mod collector;
pub mod percentiles;
pub mod stream;

pub use collector::{MetricsSnapshot, MonitorMetrics};
