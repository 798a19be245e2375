//! `GET /health` endpoint handler.
//!
//! Returns a [`HealthResponse`] JSON payload with the build version,
//! uptime, backend and cache sizes, and cumulative request statistics.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub commit: String,
    pub uptime_seconds: u64,
    pub app_name: String,
    pub backends: usize,
    pub cache_entries: usize,
    pub tracked_clients: usize,
    pub stats: StatsResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub requests_forwarded: u64,
    pub requests_failed: u64,
    pub requests_rate_limited: u64,
    pub requests_denied: u64,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stats = &state.stats;
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: env!("TURNSTILE_GIT_SHORT").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        app_name: state.config.app_name.clone(),
        backends: state.registry.len(),
        cache_entries: state.selector.cached_entries(),
        tracked_clients: state.rate_limiter.tracked_clients(),
        stats: StatsResponse {
            requests_forwarded: stats.forwarded.load(Ordering::Relaxed),
            requests_failed: stats.failed.load(Ordering::Relaxed),
            requests_rate_limited: stats.rate_limited.load(Ordering::Relaxed),
            requests_denied: stats.denied.load(Ordering::Relaxed),
        },
    })
}
