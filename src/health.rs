//! `GET /health` endpoint handler.
//!
//! Returns a [`HealthResponse`] JSON payload describing liveness, the
//! configured upstream, uptime, and cumulative forwarding counters. It
//! never contacts the upstream.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::server::AppState;

pub const SERVICE_NAME: &str = "api-proxy";

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub upstream: String,
    pub timestamp: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub keep_alive: bool,
    pub timeout_ms: u64,
    pub stats: StatsResponse,
}

#[derive(Serialize, Deserialize)]
pub struct StatsResponse {
    pub forwarded: u64,
    pub timeouts: u64,
    pub connection_failures: u64,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let config = &state.config;
    Json(HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
        upstream: config.upstream.clone(),
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        keep_alive: config.keep_alive,
        timeout_ms: config.timeout_ms(),
        stats: StatsResponse {
            forwarded: state.stats.forwarded.load(Ordering::Relaxed),
            timeouts: state.stats.timeouts.load(Ordering::Relaxed),
            connection_failures: state.stats.connection_failures.load(Ordering::Relaxed),
        },
    })
}
