// src/handlers/client_error.rs

use super::base::{ResponseHandler, Verdict};
use axum::{body::Bytes, http::StatusCode};

/// Last link of the chain. Everything the earlier handlers did not claim is
/// passed back to the caller verbatim without holding it against the key:
/// remaining 4xx are the caller's fault, remaining 5xx (501, 505, ...) are not
/// something another key would fix, and 1xx/3xx are ordinary answers.
pub struct ClientErrorHandler;

impl ResponseHandler for ClientErrorHandler {
    fn handle(&self, status: StatusCode, _body: &Bytes) -> Option<Verdict> {
        if status.is_client_error() || status.is_server_error() {
            Some(Verdict::ClientError)
        } else {
            Some(Verdict::Success)
        }
    }
}
