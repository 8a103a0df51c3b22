// src/handlers/rate_limit.rs

use super::base::{ResponseHandler, Verdict};
use axum::{body::Bytes, http::StatusCode};
use tracing::debug;

pub struct RateLimitHandler;

impl ResponseHandler for RateLimitHandler {
    fn handle(&self, status: StatusCode, _body: &Bytes) -> Option<Verdict> {
        if status == StatusCode::TOO_MANY_REQUESTS {
            debug!("Upstream rate limit hit");
            Some(Verdict::TransientFailure)
        } else {
            None
        }
    }
}
