// src/handlers/invalid_api_key.rs

use super::base::{ResponseHandler, Verdict};
use axum::{body::Bytes, http::StatusCode};

/// Error codes upstreams put in a 400 body when the credential, not the request, is bad.
const INVALID_KEY_MARKERS: &[&str] = &["invalid_api_key", "API_KEY_INVALID"];

/// Recognises responses that reject the credential itself.
pub struct InvalidApiKeyHandler;

impl ResponseHandler for InvalidApiKeyHandler {
    fn handle(&self, status: StatusCode, body: &Bytes) -> Option<Verdict> {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Some(Verdict::DisqualifyingFailure)
            }
            StatusCode::BAD_REQUEST => {
                let body_str = std::str::from_utf8(body).ok()?;
                INVALID_KEY_MARKERS
                    .iter()
                    .any(|marker| body_str.contains(marker))
                    .then_some(Verdict::DisqualifyingFailure)
            }
            _ => None,
        }
    }
}
