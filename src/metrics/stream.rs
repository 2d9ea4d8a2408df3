use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use super::collector::MetricsSnapshot;
use crate::AppState;

// ─── GET /api/metrics ────────────────────────────────────────────
/// Returns a single JSON snapshot, handy for curl.

pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

// ─── GET /api/metrics/stream ─────────────────────────────────────
/// Server-Sent Events endpoint.
/// Checks for new ticks every 500 ms and pushes a `MetricsSnapshot` only
/// when one has landed, so an idle monitor sends nothing but keep-alives.
/// The event id is the tick count.

pub async fn metrics_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(Duration::from_millis(500));
    let mut seen = TickCursor::default();

    let stream = IntervalStream::new(interval).filter_map(move |_| {
        let snapshot = state.metrics.snapshot();
        if !seen.advance(snapshot.total_ticks) {
            return None;
        }
        let json = serde_json::to_string(&snapshot).unwrap_or_default();
        Some(Ok(Event::default()
            .event("metrics")
            .id(snapshot.total_ticks.to_string())
            .data(json)))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Remembers the tick count last pushed to a stream subscriber.
#[derive(Debug, Default)]
struct TickCursor {
    last: Option<u64>,
}

impl TickCursor {
    /// True when `ticks` differs from what was last pushed. The first call
    /// always reports a change so a new subscriber gets the current state.
    fn advance(&mut self, ticks: u64) -> bool {
        if self.last == Some(ticks) {
            return false;
        }
        self.last = Some(ticks);
        true
    }
}
