// src/handlers/server_error.rs

use super::base::{ResponseHandler, Verdict};
use axum::{body::Bytes, http::StatusCode};
use tracing::warn;

/// Server errors that indicate temporary trouble upstream and should move
/// the request to another key.
pub struct ServerErrorHandler;

impl ResponseHandler for ServerErrorHandler {
    fn handle(&self, status: StatusCode, body: &Bytes) -> Option<Verdict> {
        if matches!(
            status,
            StatusCode::INTERNAL_SERVER_ERROR
                | StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT
        ) {
            warn!(
                status = status.as_u16(),
                response_body = %String::from_utf8_lossy(body),
                "Upstream server error"
            );
            return Some(Verdict::TransientFailure);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(status: StatusCode, body: &str) -> Option<Verdict> {
        ServerErrorHandler.handle(status, &Bytes::from(body.to_string()))
    }

    #[test]
    fn test_server_error_handler_500() {
        let body = r#"{"error":{"message":"The server had an error while processing your request.","type":"server_error"}}"#;
        assert_eq!(
            handle(StatusCode::INTERNAL_SERVER_ERROR, body),
            Some(Verdict::TransientFailure)
        );
    }

    #[test]
    fn test_server_error_handler_gateway_family() {
        for status in [
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::GATEWAY_TIMEOUT,
        ] {
            assert_eq!(handle(status, ""), Some(Verdict::TransientFailure));
        }
    }

    #[test]
    fn test_server_error_handler_ignores_other_statuses() {
        assert!(handle(StatusCode::NOT_IMPLEMENTED, "").is_none());
        assert!(handle(StatusCode::BAD_REQUEST, "").is_none());
        assert!(handle(StatusCode::OK, "").is_none());
    }
}
