// src/admin.rs

use crate::{
    pool::{BlacklistEntry, PoolStats, ResetSummary},
    state::AppState,
};
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Introspection and maintenance routes. Only `POST /reset-keys` mutates state,
/// so only it sits behind the admin token.
pub fn admin_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let authed_routes = Router::new()
        .route("/reset-keys", post(reset_keys))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::admin_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .route("/blacklist", get(blacklist))
        .merge(authed_routes)
}

// --- Response Structs ---

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    pub uptime_seconds: i64,
    pub total_keys: usize,
    pub eligible_keys: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub pool: PoolStats,
    pub eligible_keys: usize,
    pub uptime_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct BlacklistResponse {
    pub count: usize,
    pub keys: Vec<BlacklistEntry>,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub message: String,
    #[serde(flatten)]
    pub summary: ResetSummary,
}

// --- Route Handlers ---

/// 200 while at least one key can be selected, 503 otherwise.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let eligible_keys = state.stats.eligible_keys();
    let healthy = eligible_keys > 0;
    let body = HealthStatus {
        status: if healthy { "healthy" } else { "unhealthy" },
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_secs(),
        total_keys: state.store.len(),
        eligible_keys,
    };
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let pool = state.stats.snapshot();
    Json(StatsResponse {
        eligible_keys: state.stats.eligible_keys(),
        uptime_seconds: state.uptime_secs(),
        pool,
    })
}

pub async fn blacklist(State(state): State<Arc<AppState>>) -> Json<BlacklistResponse> {
    let keys = state.blacklist.entries();
    Json(BlacklistResponse {
        count: keys.len(),
        keys,
    })
}

pub async fn reset_keys(State(state): State<Arc<AppState>>) -> Json<ResetResponse> {
    let summary = state.blacklist.reset_all();
    info!(
        reset = summary.reset,
        previously_blacklisted = summary.previously_blacklisted,
        "Key pool reset via admin endpoint"
    );
    Json(ResetResponse {
        message: format!("Reset {} keys", summary.reset),
        summary,
    })
}
