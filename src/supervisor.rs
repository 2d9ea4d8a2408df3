use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::collector::{SharedSink, SnapshotCollector};
use crate::config::{ComponentConfig, Properties, SinkKind};
use crate::error::{ConfigError, MonitorError, SchedulerError};
use crate::metrics::MonitorMetrics;
use crate::scheduler::PollingScheduler;
use crate::sink::{RecordSink, SinkHandle, SinkState};
use crate::source::CounterSource;

/// Point-in-time view of the monitor for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub interval_ms: u64,
    pub ticks: u64,
    pub sink_kind: SinkKind,
    pub sink_target: String,
    pub sink_state: SinkState,
    pub config: ComponentConfig,
}

/// Last known sink description, refreshed whenever the supervisor opens,
/// closes or replaces the sink. Readable while a tick holds the sink.
#[derive(Debug, Clone)]
struct SinkView {
    kind: SinkKind,
    target: String,
    state: SinkState,
}

impl SinkView {
    fn of(sink: &SinkHandle) -> Self {
        Self {
            kind: sink.kind(),
            target: sink.describe(),
            state: sink.state(),
        }
    }
}

/// Composition root: wires the counter source, the configured sink and the
/// scheduler, and owns their startup and shutdown order.
///
/// `activate`, `reconfigure` and `deactivate` are serialised by one
/// lifecycle lock, so a rejected call never touches the sink.
pub struct Supervisor {
    source: Arc<dyn CounterSource>,
    config: Mutex<ComponentConfig>,
    sink: SharedSink<SinkHandle>,
    sink_view: Mutex<SinkView>,
    scheduler: PollingScheduler,
    metrics: Arc<MonitorMetrics>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl Supervisor {
    pub fn new(source: Arc<dyn CounterSource>, metrics: Arc<MonitorMetrics>) -> Self {
        let config = ComponentConfig::default();
        let sink = SinkHandle::from_config(&config);
        Self {
            source,
            sink_view: Mutex::new(SinkView::of(&sink)),
            sink: Arc::new(tokio::sync::Mutex::new(sink)),
            scheduler: PollingScheduler::new(config.polling_interval()),
            config: Mutex::new(config),
            metrics,
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> ComponentConfig {
        self.config.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn metrics(&self) -> &Arc<MonitorMetrics> {
        &self.metrics
    }

    /// Apply `props`, open the sink and start polling.
    ///
    /// A sink that fails to open does not prevent polling; its records are
    /// dropped until a reconfiguration brings up a working destination.
    pub async fn activate(&self, props: &Properties) -> Result<(), MonitorError> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.scheduler.is_running() {
            return Err(SchedulerError::AlreadyRunning.into());
        }
        self.start_polling(props).await
    }

    /// Start polling with the current configuration and fresh metrics.
    /// Metrics are left alone when the monitor is already running.
    pub async fn restart(&self) -> Result<(), MonitorError> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.scheduler.is_running() {
            return Err(SchedulerError::AlreadyRunning.into());
        }
        self.metrics.reset();
        self.start_polling(&Properties::new()).await
    }

    async fn start_polling(&self, props: &Properties) -> Result<(), MonitorError> {
        let cfg = self.apply_properties(props);

        {
            let mut sink = self.sink.lock().await;
            if sink.state() != SinkState::Closed {
                if let Err(e) = sink.close().await {
                    warn!(sink = %sink.describe(), error = %e, "stale sink not closed cleanly");
                }
            }
            *sink = SinkHandle::from_config(&cfg);
            open_sink(&mut sink).await;
            self.publish_sink(&sink);
        }

        let collector = Arc::new(SnapshotCollector::new(
            self.source.clone(),
            self.sink.clone(),
            self.metrics.clone(),
        ));
        self.scheduler
            .start(cfg.polling_interval(), collector)
            .await?;
        info!(
            interval_ms = cfg.polling_interval_ms,
            sink = %cfg.sink,
            "link stats monitor started"
        );
        Ok(())
    }

    /// Apply new properties to a running or idle monitor.
    ///
    /// An interval change takes effect from the next tick. A destination
    /// change waits for the tick in flight, swaps the sink and lets polling
    /// resume.
    pub async fn reconfigure(&self, props: &Properties) -> Vec<ConfigError> {
        let _lifecycle = self.lifecycle.lock().await;
        let previous = self.config();
        let (cfg, errors) = ComponentConfig::resolve(props, &previous);
        log_config_errors(&errors);
        *self.config.lock() = cfg.clone();

        if cfg.polling_interval_ms != previous.polling_interval_ms {
            // interval is validated non-zero by resolve
            if let Err(e) = self.scheduler.reconfigure_interval(cfg.polling_interval()) {
                warn!(error = %e, "polling interval not applied");
            }
        }

        if previous.sink_target_differs(&cfg) {
            // Holding the lock pauses ticks; the one in flight finishes first.
            let mut sink = self.sink.lock().await;
            if let Err(e) = sink.close().await {
                error!(sink = %sink.describe(), error = %e, "could not close sink properly");
            }
            *sink = SinkHandle::from_config(&cfg);
            if self.scheduler.is_running() {
                open_sink(&mut sink).await;
            }
            self.publish_sink(&sink);
            info!(sink = %sink.describe(), "record sink replaced");
        }
        errors
    }

    /// Stop polling, then flush and close the sink. Idempotent.
    pub async fn deactivate(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.scheduler.stop().await;
        let mut sink = self.sink.lock().await;
        if sink.state() != SinkState::Closed {
            if let Err(e) = sink.close().await {
                error!(sink = %sink.describe(), error = %e, "error closing sink, deactivating anyway");
            }
        }
        self.publish_sink(&sink);
        info!("link stats monitor stopped");
    }

    /// Never waits on the sink, so it answers while a tick is running.
    pub fn status(&self) -> MonitorStatus {
        let sink = self.sink_view.lock().clone();
        MonitorStatus {
            running: self.scheduler.is_running(),
            interval_ms: self.scheduler.interval().as_millis() as u64,
            ticks: self.scheduler.ticks(),
            sink_kind: sink.kind,
            sink_target: sink.target,
            sink_state: sink.state,
            config: self.config(),
        }
    }

    fn publish_sink(&self, sink: &SinkHandle) {
        *self.sink_view.lock() = SinkView::of(sink);
    }

    fn apply_properties(&self, props: &Properties) -> ComponentConfig {
        let mut config = self.config.lock();
        let (cfg, errors) = ComponentConfig::resolve(props, &config);
        log_config_errors(&errors);
        *config = cfg.clone();
        cfg
    }
}

async fn open_sink(sink: &mut SinkHandle) {
    if let Err(e) = sink.open().await {
        match sink.kind() {
            SinkKind::Broker => error!(
                sink = %sink.describe(),
                error = %e,
                "failed to connect to the broker, is the broker up? records will be dropped"
            ),
            SinkKind::File => error!(
                sink = %sink.describe(),
                error = %e,
                "unable to open port stats file, records will be dropped"
            ),
        }
    }
}

fn log_config_errors(errors: &[ConfigError]) {
    for e in errors {
        warn!(error = %e, "configuration value ignored");
    }
}
