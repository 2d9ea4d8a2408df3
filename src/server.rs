use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::metrics::stream;
use crate::middleware::timing;
use crate::AppState;

/// Builds the control API `Router` with all routes and middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Monitor lifecycle ───────────────────────────────────
        .route("/api/status", get(handlers::monitor::status))
        .route("/api/monitor/start", post(handlers::monitor::start_monitor))
        .route("/api/monitor/stop", post(handlers::monitor::stop_monitor))
        // ── Live reconfiguration ────────────────────────────────
        .route("/api/config", post(handlers::monitor::update_config))
        // ── Metrics ─────────────────────────────────────────────
        .route("/api/metrics", get(stream::get_metrics))
        .route("/api/metrics/stream", get(stream::metrics_stream))
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn(timing::timing_middleware))
        .layer(CorsLayer::permissive())
}
