use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{MonitorError, SinkError};
use crate::metrics::MonitorMetrics;
use crate::record::StatsRecord;
use crate::scheduler::PollTask;
use crate::sink::RecordSink;
use crate::source::CounterSource;

/// Sink shared between the tick task and reconfiguration. A tick holds the
/// lock for its whole run, so taking it from outside waits for the tick.
pub type SharedSink<K> = Arc<Mutex<K>>;

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Active links enumerated.
    pub links: u64,
    pub written: u64,
    /// Links without a statistics sample.
    pub skipped: u64,
    pub write_errors: u64,
    /// Records discarded because the sink is not open.
    pub dropped: u64,
}

/// Walks the active links once per tick and hands one record per link to
/// the sink.
pub struct SnapshotCollector<K> {
    source: Arc<dyn CounterSource>,
    sink: SharedSink<K>,
    metrics: Arc<MonitorMetrics>,
}

impl<K: RecordSink> SnapshotCollector<K> {
    pub fn new(
        source: Arc<dyn CounterSource>,
        sink: SharedSink<K>,
        metrics: Arc<MonitorMetrics>,
    ) -> Self {
        Self {
            source,
            sink,
            metrics,
        }
    }

    /// Run one snapshot.
    ///
    /// Missing samples and failed writes are logged and counted; only a
    /// write on a sink that was already shut down aborts the tick.
    pub async fn collect(&self) -> Result<TickReport, MonitorError> {
        let started = Instant::now();
        let mut sink = self.sink.lock().await;
        let links = self.source.active_links();
        let mut report = TickReport {
            links: links.len() as u64,
            ..TickReport::default()
        };

        for link in &links {
            let Some(counters) = self
                .source
                .delta_counters(&link.src.device_id, &link.src.port)
            else {
                warn!(
                    src = %link.src.device_id,
                    dst = %link.dst.device_id,
                    port = %link.src.port,
                    "no port stats for link"
                );
                report.skipped += 1;
                continue;
            };

            let record = StatsRecord::new(Utc::now(), link, &counters);
            let write_started = Instant::now();
            let outcome = sink.write(&record).await;
            match outcome {
                Ok(()) => {
                    report.written += 1;
                    self.metrics.record_write(write_started.elapsed());
                }
                Err(SinkError::Unavailable(_)) => report.dropped += 1,
                Err(SinkError::ShutDown(target)) => {
                    drop(sink);
                    self.metrics.record_failed_tick(&report, started.elapsed());
                    return Err(MonitorError::WriteAfterShutdown(target));
                }
                Err(e) => {
                    warn!(
                        src = %link.src.device_id,
                        dst = %link.dst.device_id,
                        error = %e,
                        "failed port stats write"
                    );
                    report.write_errors += 1;
                }
            }
        }

        if report.dropped > 0 {
            warn!(
                sink = %sink.describe(),
                dropped = report.dropped,
                "sink not available, skipping"
            );
        }
        drop(sink);

        self.metrics.record_tick(&report, started.elapsed());
        debug!(
            links = report.links,
            written = report.written,
            skipped = report.skipped,
            "tick complete"
        );
        Ok(report)
    }
}

impl<K: RecordSink + 'static> PollTask for SnapshotCollector<K> {
    async fn run(&self) -> Result<(), MonitorError> {
        self.collect().await.map(|_| ())
    }
}
