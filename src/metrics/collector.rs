use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use super::percentiles::PercentileSet;
use crate::collector::TickReport;

// ─── Configuration ───────────────────────────────────────────────

/// How many tick summaries we keep for the live feed
const MAX_RECENT_TICKS: usize = 100;

/// HdrHistogram range: 1 μs → 60 s, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 60_000_000;
const HIST_SIGFIG: u8 = 3;

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe tick statistics.
/// The collector calls `record_*()`, the API calls `snapshot()`.
pub struct MonitorMetrics {
    inner: Mutex<Inner>,
}

/// One finished tick in the live feed.
#[derive(Debug, Clone, Serialize)]
pub struct TickSummary {
    pub finished_at: DateTime<Utc>,
    pub links: u64,
    pub written: u64,
    pub skipped: u64,
    pub write_errors: u64,
    pub dropped: u64,
    pub duration_us: u64,
}

/// Complete snapshot served by `/api/metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub tick_latency: PercentileSet,
    pub write_latency: PercentileSet,

    // Counters
    pub total_ticks: u64,
    pub failed_ticks: u64,
    pub links_seen: u64,
    pub records_written: u64,
    pub links_skipped: u64,
    pub write_errors: u64,
    pub records_dropped: u64,
    pub records_per_sec: f64,
    pub elapsed_secs: f64,

    pub recent_ticks: Vec<TickSummary>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    tick_hist: Histogram<u64>,
    write_hist: Histogram<u64>,

    total_ticks: u64,
    failed_ticks: u64,
    links_seen: u64,
    records_written: u64,
    links_skipped: u64,
    write_errors: u64,
    records_dropped: u64,

    recent_ticks: VecDeque<TickSummary>,

    // Wall-clock anchor for rates
    start_time: Option<Instant>,
}

// ─── MonitorMetrics impl ─────────────────────────────────────────

impl MonitorMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Account for one completed tick.
    pub fn record_tick(&self, report: &TickReport, elapsed: Duration) {
        self.inner.lock().record_tick(report, elapsed);
    }

    /// A tick that ended in an error. What it got done before failing is
    /// still counted.
    pub fn record_failed_tick(&self, partial: &TickReport, elapsed: Duration) {
        let mut inner = self.inner.lock();
        inner.record_tick(partial, elapsed);
        inner.failed_ticks += 1;
    }

    /// Latency of one successful sink write.
    pub fn record_write(&self, elapsed: Duration) {
        let us = (elapsed.as_micros() as u64).max(HIST_LOW);
        let _ = self.inner.lock().write_hist.record(us);
    }

    /// Wipe all data, e.g. when monitoring is restarted.
    pub fn reset(&self) {
        *self.inner.lock() = Inner::new();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().snapshot()
    }
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

fn histogram() -> Histogram<u64> {
    Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
        .expect("histogram creation")
}

impl Inner {
    fn new() -> Self {
        Self {
            tick_hist: histogram(),
            write_hist: histogram(),
            total_ticks: 0,
            failed_ticks: 0,
            links_seen: 0,
            records_written: 0,
            links_skipped: 0,
            write_errors: 0,
            records_dropped: 0,
            recent_ticks: VecDeque::with_capacity(MAX_RECENT_TICKS + 1),
            start_time: None,
        }
    }

    fn record_tick(&mut self, report: &TickReport, elapsed: Duration) {
        self.start_time.get_or_insert_with(Instant::now);

        self.total_ticks += 1;
        self.links_seen += report.links;
        self.records_written += report.written;
        self.links_skipped += report.skipped;
        self.write_errors += report.write_errors;
        self.records_dropped += report.dropped;

        let duration_us = (elapsed.as_micros() as u64).max(HIST_LOW);
        let _ = self.tick_hist.record(duration_us);

        self.recent_ticks.push_back(TickSummary {
            finished_at: Utc::now(),
            links: report.links,
            written: report.written,
            skipped: report.skipped,
            write_errors: report.write_errors,
            dropped: report.dropped,
            duration_us,
        });
        if self.recent_ticks.len() > MAX_RECENT_TICKS {
            self.recent_ticks.pop_front();
        }
    }

    fn snapshot(&self) -> MetricsSnapshot {
        let elapsed_secs = self
            .start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        let records_per_sec = if elapsed_secs > 0.0 {
            self.records_written as f64 / elapsed_secs
        } else {
            0.0
        };

        MetricsSnapshot {
            tick_latency: PercentileSet::from_histogram(&self.tick_hist),
            write_latency: PercentileSet::from_histogram(&self.write_hist),
            total_ticks: self.total_ticks,
            failed_ticks: self.failed_ticks,
            links_seen: self.links_seen,
            records_written: self.records_written,
            links_skipped: self.links_skipped,
            write_errors: self.write_errors,
            records_dropped: self.records_dropped,
            records_per_sec,
            elapsed_secs,
            recent_ticks: self.recent_ticks.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(links: u64, written: u64) -> TickReport {
        TickReport {
            links,
            written,
            skipped: links - written,
            ..TickReport::default()
        }
    }

    #[test]
    fn ticks_accumulate_counters() {
        let m = MonitorMetrics::new();
        m.record_tick(&report(4, 3), Duration::from_millis(2));
        m.record_tick(&report(4, 4), Duration::from_millis(3));
        m.record_failed_tick(&report(4, 1), Duration::from_millis(1));

        let snap = m.snapshot();
        assert_eq!(snap.total_ticks, 3);
        assert_eq!(snap.failed_ticks, 1);
        assert_eq!(snap.links_seen, 12);
        assert_eq!(snap.records_written, 8);
        assert_eq!(snap.links_skipped, 4);
        assert_eq!(snap.tick_latency.count, 3);
        assert_eq!(snap.recent_ticks.len(), 3);
    }

    #[test]
    fn live_feed_is_bounded() {
        let m = MonitorMetrics::new();
        for _ in 0..(MAX_RECENT_TICKS + 20) {
            m.record_tick(&report(1, 1), Duration::from_micros(10));
        }
        let snap = m.snapshot();
        assert_eq!(snap.recent_ticks.len(), MAX_RECENT_TICKS);
        assert_eq!(snap.total_ticks, (MAX_RECENT_TICKS + 20) as u64);
    }

    #[test]
    fn reset_clears_everything() {
        let m = MonitorMetrics::new();
        m.record_tick(&report(2, 2), Duration::from_millis(1));
        m.record_write(Duration::from_micros(40));
        m.reset();
        let snap = m.snapshot();
        assert_eq!(snap.total_ticks, 0);
        assert!(!snap.write_latency.has_data());
    }
}
