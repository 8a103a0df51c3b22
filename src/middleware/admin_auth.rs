// src/middleware/admin_auth.rs

use crate::{error::AppError, state::AppState};
use axum::{
    body::Body,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Compares without short-circuiting on the first differing byte.
fn secure_compare(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Guards mutating admin routes. With no `server.admin_token` configured the
/// route is open; otherwise the request must carry `Authorization: Bearer <token>`.
pub async fn admin_auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let expected = state
        .config
        .server
        .admin_token
        .as_deref()
        .filter(|t| !t.is_empty());

    let Some(expected) = expected else {
        return Ok(next.run(req).await);
    };

    match bearer_token(&req) {
        Some(token) if secure_compare(token, expected) => {
            debug!("Admin authentication successful");
            Ok(next.run(req).await)
        }
        _ => {
            warn!(path = %req.uri().path(), "Admin authentication failed: invalid or missing token");
            Err(AppError::Unauthorized)
        }
    }
}
