// src/handlers/success.rs

use super::base::{ResponseHandler, Verdict};
use axum::{body::Bytes, http::StatusCode};

pub struct SuccessHandler;

impl ResponseHandler for SuccessHandler {
    fn handle(&self, status: StatusCode, _body: &Bytes) -> Option<Verdict> {
        status.is_success().then_some(Verdict::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_handler_accepts_2xx() {
        for code in [200, 201, 204, 299] {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(
                SuccessHandler.handle(status, &Bytes::new()),
                Some(Verdict::Success)
            );
        }
    }

    #[test]
    fn test_success_handler_ignores_errors() {
        assert!(SuccessHandler
            .handle(StatusCode::TOO_MANY_REQUESTS, &Bytes::new())
            .is_none());
        assert!(SuccessHandler
            .handle(StatusCode::BAD_REQUEST, &Bytes::new())
            .is_none());
    }
}
