// src/middleware/request_size_limit.rs

use crate::{error::AppError, state::AppState};
use axum::{
    body::Body,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

/// Rejects requests whose declared `Content-Length` exceeds `server.max_body_bytes`.
/// Bodies without a declared length are rejected by the proxy handler once
/// buffering crosses the same limit.
pub async fn request_size_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let max_size = state.config.server.max_body_bytes;
    let declared = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    if let Some(size) = declared.filter(|size| *size > max_size) {
        warn!(
            content_length = size,
            max_size,
            method = %request.method(),
            "Request rejected: body size exceeds limit"
        );
        return Err(AppError::RequestTooLarge { size, max_size });
    }

    Ok(next.run(request).await)
}
