// src/lib.rs

pub mod admin;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod key_check;
pub mod middleware;
pub mod pool;
pub mod proxy;
pub mod state;

use crate::proxy::proxy_handler;
use axum::{
    body::Body,
    http::{HeaderValue, Request as AxumRequest},
    response::IntoResponse,
    Router,
};
use std::{path::Path, sync::Arc, time::Instant};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub use config::{AppConfig, ConfigOverrides};
pub use error::{AppError, Result};
pub use state::AppState;

/// Builds the application router: introspection routes plus a catch-all that
/// proxies everything else upstream.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(admin::admin_routes(state.clone()))
        .fallback(proxy_handler)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::request_size_limit_middleware,
        ))
        .layer(axum::middleware::from_fn(trace_requests))
        .with_state(state)
}

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Reuses a caller-supplied request id when it is sane, otherwise mints one.
fn request_id_for(req: &AxumRequest<Body>) -> String {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|id| !id.is_empty() && id.len() <= 128)
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string)
}

/// Opens a `request` span for every inbound call, echoes the request id back
/// and logs status and latency once the response is ready.
async fn trace_requests(req: AxumRequest<Body>, next: axum::middleware::Next) -> impl IntoResponse {
    let request_id = request_id_for(&req);
    let started = Instant::now();
    let span = info_span!(
        "request",
        request_id = %request_id,
        http.method = %req.method(),
        url.path = %req.uri().path(),
    );

    async move {
        let mut response = next.run(req).await;
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }

        let status = response.status().as_u16();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if response.status().is_server_error() {
            warn!(http.status_code = status, elapsed_ms, "Request finished with server error");
        } else {
            info!(http.status_code = status, elapsed_ms, "Request finished");
        }
        response
    }
    .instrument(span)
    .await
}

/// Loads configuration and builds the router. Errors here are fatal at startup.
pub fn run(config_path: &Path, overrides: &ConfigOverrides) -> Result<(Router, AppConfig)> {
    info!("Starting API key pool proxy...");

    let app_config = setup_configuration(config_path, overrides)?;
    let app_state = AppState::new(app_config.clone()).map_err(|e| {
        error!(error = ?e, "Failed to initialize application state. Exiting.");
        e
    })?;
    info!("Application state initialized successfully.");

    Ok((create_router(Arc::new(app_state)), app_config))
}

/// Loads, validates and logs the application configuration.
pub fn setup_configuration(config_path: &Path, overrides: &ConfigOverrides) -> Result<AppConfig> {
    let config_path_display = config_path.display().to_string();
    if config_path.exists() {
        info!(config.path = %config_path_display, "Using configuration file");
    } else {
        info!(config.path = %config_path_display, "Optional configuration file not found. Using defaults and environment variables.");
    }

    let app_config = config::load_config(config_path, overrides).map_err(|e| {
        error!(
            config.path = %config_path_display,
            error = ?e,
            "Failed to load or validate configuration. Exiting."
        );
        e
    })?;

    config::log_config_summary(&app_config);
    Ok(app_config)
}
