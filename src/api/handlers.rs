//! HTTP API handlers.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use time::OffsetDateTime;

use crate::engine::DipArbEngine;

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Engine whose status is exposed.
    pub engine: Arc<DipArbEngine>,
}

impl AppState {
    /// Create new app state around an engine.
    pub fn new(engine: Arc<DipArbEngine>) -> Self {
        Self { engine }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether the engine is monitoring a market.
    pub ready: bool,
    /// Current market slug if available.
    pub market: Option<String>,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service status.
    pub status: &'static str,
    /// Current market slug.
    pub market: Option<String>,
    /// Engine statistics.
    pub stats: StatsResponse,
}

/// Engine statistics in the status response.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Rounds opened.
    pub rounds_monitored: u64,
    /// Rounds completed.
    pub rounds_completed: u64,
    /// Completed rounds with positive profit.
    pub rounds_successful: u64,
    /// Rounds expired unhedged.
    pub rounds_expired: u64,
    /// Signals detected.
    pub signals_detected: u64,
    /// Entry legs filled.
    pub entry_fills: u64,
    /// Hedge legs filled.
    pub hedge_fills: u64,
    /// Cumulative quote spent.
    pub total_spent: String,
    /// Cumulative realised profit.
    pub total_profit: String,
    /// Seconds since first start.
    pub running_seconds: Option<u64>,
}

/// Health check handler. Always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness handler. 200 when the engine is monitoring, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let is_ready = state.engine.is_active();
    let response = ReadyResponse {
        ready: is_ready,
        market: state.engine.current_market().map(|m| m.slug),
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler with a statistics snapshot.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.engine.statistics();
    let status = if state.engine.is_active() {
        "running"
    } else {
        "idle"
    };

    Json(StatusResponse {
        status,
        market: state.engine.current_market().map(|m| m.slug),
        stats: StatsResponse {
            rounds_monitored: stats.rounds_monitored,
            rounds_completed: stats.rounds_completed,
            rounds_successful: stats.rounds_successful,
            rounds_expired: stats.rounds_expired,
            signals_detected: stats.signals_detected,
            entry_fills: stats.entry_fills,
            hedge_fills: stats.hedge_fills,
            total_spent: stats.total_spent.to_string(),
            total_profit: stats.total_profit.to_string(),
            running_seconds: stats
                .running_time(OffsetDateTime::now_utc())
                .map(|d| d.as_secs()),
        },
    })
}
