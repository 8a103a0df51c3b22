// src/handlers/base.rs

use axum::{body::Bytes, http::StatusCode};
use serde::Serialize;

/// How an upstream outcome reflects on the key that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The key worked.
    Success,
    /// The caller's request was at fault; the key is healthy and the response goes back verbatim.
    ClientError,
    /// Temporary upstream trouble (rate limit, 5xx, timeout). Counts toward the failure threshold.
    TransientFailure,
    /// The credential itself was rejected. Blacklists on first occurrence.
    DisqualifyingFailure,
}

impl Verdict {
    /// Whether this outcome counts as a failure of the key.
    pub fn is_key_failure(self) -> bool {
        matches!(self, Self::TransientFailure | Self::DisqualifyingFailure)
    }
}

/// One link of the classification chain. Each implementation recognises a
/// specific class of upstream response.
pub trait ResponseHandler: Send + Sync {
    /// Returns `Some(verdict)` if this handler recognises the response, or `None`
    /// to let the next handler in the chain try.
    fn handle(&self, status: StatusCode, body: &Bytes) -> Option<Verdict>;
}
