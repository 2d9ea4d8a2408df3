use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::config::properties_from_json;
use crate::supervisor::MonitorStatus;
use crate::AppState;

use super::AppError;

// ─── Response types ──────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub running: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub status: MonitorStatus,
    /// Properties that were rejected and left at their previous value.
    pub rejected: Vec<String>,
}

// ─── GET /api/status ─────────────────────────────────────────────

pub async fn status(State(state): State<Arc<AppState>>) -> Json<MonitorStatus> {
    Json(state.supervisor.status())
}

// ─── POST /api/monitor/start ─────────────────────────────────────

pub async fn start_monitor(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ControlResponse>, AppError> {
    // Only one polling loop at a time; a rejected start changes nothing
    state.supervisor.restart().await?;

    let cfg = state.supervisor.config();
    Ok(Json(ControlResponse {
        running: true,
        message: format!(
            "Polling every {} ms into {} sink",
            cfg.polling_interval_ms, cfg.sink
        ),
    }))
}

// ─── POST /api/monitor/stop ──────────────────────────────────────

pub async fn stop_monitor(State(state): State<Arc<AppState>>) -> Json<ControlResponse> {
    if !state.supervisor.is_running() {
        return Json(ControlResponse {
            running: false,
            message: "Monitor is not running".into(),
        });
    }

    state.supervisor.deactivate().await;
    Json(ControlResponse {
        running: false,
        message: "Monitor stopped".into(),
    })
}

// ─── POST /api/config ────────────────────────────────────────────

/// Body is a flat JSON object of configuration properties, e.g.
/// `{"pollingInterval": 1000, "csvFileBaseName": "port_stats"}`.
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Map<String, serde_json::Value>>,
) -> Result<Json<ConfigResponse>, AppError> {
    if body.is_empty() {
        return Err(AppError::BadRequest("no properties given".into()));
    }

    let props = properties_from_json(body);
    let rejected = state
        .supervisor
        .reconfigure(&props)
        .await
        .into_iter()
        .map(|e| e.to_string())
        .collect();

    Ok(Json(ConfigResponse {
        status: state.supervisor.status(),
        rejected,
    }))
}
