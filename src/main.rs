use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use link_stats_monitor::config::{
    self, Properties, KEY_BROKER_TOPIC, KEY_BROKER_URL, KEY_CSV_FILE_BASE_NAME,
    KEY_POLLING_INTERVAL, KEY_PUBLISH_TIMEOUT, KEY_SINK,
};
use link_stats_monitor::metrics::MonitorMetrics;
use link_stats_monitor::{server, AppState, SimulatedTopology, Supervisor};

/// Periodically records per-link port statistics to CSV or a Redis topic.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Address of the control API.
    #[arg(long, default_value = "0.0.0.0:3000")]
    listen: String,

    /// Polling interval in milliseconds.
    #[arg(long, default_value_t = config::DEFAULT_POLLING_INTERVAL_MS)]
    polling_interval: u64,

    /// CSV file base name; `.csv` is appended.
    #[arg(long, default_value = config::DEFAULT_CSV_FILE_BASE_NAME)]
    csv_file_base_name: PathBuf,

    /// Record sink: `file` or `broker`.
    #[arg(long, default_value = "file")]
    sink: String,

    #[arg(long, default_value = config::DEFAULT_BROKER_URL)]
    broker_url: String,

    #[arg(long, default_value = config::DEFAULT_BROKER_TOPIC)]
    broker_topic: String,

    /// Upper bound for a broker connect or publish, in milliseconds.
    #[arg(long, default_value_t = config::DEFAULT_PUBLISH_TIMEOUT_MS)]
    publish_timeout: u64,

    /// Switches in the simulated ring topology.
    #[arg(long, default_value_t = 4)]
    switches: usize,

    /// Seed for the simulated counters.
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Percentage of polls for which a simulated port reports no sample.
    #[arg(long, default_value_t = 0)]
    missing_pct: u8,

    /// Serve the control API but wait for `POST /api/monitor/start`.
    #[arg(long)]
    no_autostart: bool,
}

impl Cli {
    fn properties(&self) -> Properties {
        [
            (KEY_POLLING_INTERVAL, self.polling_interval.to_string()),
            (
                KEY_CSV_FILE_BASE_NAME,
                self.csv_file_base_name.display().to_string(),
            ),
            (KEY_SINK, self.sink.clone()),
            (KEY_BROKER_URL, self.broker_url.clone()),
            (KEY_BROKER_TOPIC, self.broker_topic.clone()),
            (KEY_PUBLISH_TIMEOUT, self.publish_timeout.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect()
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    println!();
    println!("╔══════════════════════════════════════════════════╗");
    println!("║   📡  LINK STATS MONITOR                         ║");
    println!("╚══════════════════════════════════════════════════╝");
    println!();

    // ── 1. Counter source ────────────────────────────────────────
    let topology = SimulatedTopology::ring(cli.switches, cli.seed)
        .with_missing_samples(cli.missing_pct);
    info!(
        switches = cli.switches,
        links = topology.link_count(),
        "simulated topology ready"
    );

    // ── 2. Build shared state ────────────────────────────────────
    let metrics = Arc::new(MonitorMetrics::new());
    let state = Arc::new(AppState {
        supervisor: Supervisor::new(Arc::new(topology), metrics.clone()),
        metrics,
    });

    // ── 3. Activate ──────────────────────────────────────────────
    let props = cli.properties();
    if cli.no_autostart {
        state.supervisor.reconfigure(&props).await;
    } else if let Err(e) = state.supervisor.activate(&props).await {
        error!(error = %e, "activation failed");
        std::process::exit(1);
    }

    // ── 4. Bind & serve ──────────────────────────────────────────
    let listener = match tokio::net::TcpListener::bind(&cli.listen).await {
        Ok(l) => l,
        Err(e) => {
            error!(addr = %cli.listen, error = %e, "failed to bind control API");
            state.supervisor.deactivate().await;
            std::process::exit(1);
        }
    };

    println!("Control API     → http://{}/api/status", cli.listen);
    println!("Metrics JSON    → http://{}/api/metrics", cli.listen);
    println!("Metrics SSE     → http://{}/api/metrics/stream", cli.listen);
    println!();

    let app = server::create_router(state.clone());
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = served {
        error!(error = %e, "control API exited with error");
    }

    // ── 5. Deactivate ────────────────────────────────────────────
    state.supervisor.deactivate().await;
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
