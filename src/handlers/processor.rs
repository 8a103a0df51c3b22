// src/handlers/processor.rs

use crate::handlers::{
    base::{ResponseHandler, Verdict},
    client_error::ClientErrorHandler,
    invalid_api_key::InvalidApiKeyHandler,
    rate_limit::RateLimitHandler,
    server_error::ServerErrorHandler,
    success::SuccessHandler,
};
use crate::proxy::TransportError;
use axum::{body::Bytes, http::StatusCode};
use std::sync::Arc;

/// What came back from one upstream attempt, as far as classification cares.
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    Response { status: StatusCode, body: &'a Bytes },
    Transport(&'a TransportError),
}

/// Maps upstream outcomes to [`Verdict`]s by running a chain of handlers;
/// the first handler that recognises the response decides. Stateless.
#[derive(Clone)]
pub struct HealthClassifier {
    handlers: Arc<Vec<Box<dyn ResponseHandler>>>,
}

impl HealthClassifier {
    pub fn new(handlers: Vec<Box<dyn ResponseHandler>>) -> Self {
        Self {
            handlers: Arc::new(handlers),
        }
    }

    pub fn classify(&self, outcome: Outcome<'_>) -> Verdict {
        match outcome {
            // Timeouts, refused connections and broken streams all look like
            // temporary unavailability from the key's point of view.
            Outcome::Transport(_) => Verdict::TransientFailure,
            Outcome::Response { status, body } => self.classify_response(status, body),
        }
    }

    pub fn classify_response(&self, status: StatusCode, body: &Bytes) -> Verdict {
        self.handlers
            .iter()
            .find_map(|handler| handler.handle(status, body))
            .unwrap_or(Verdict::ClientError)
    }
}

impl Default for HealthClassifier {
    fn default() -> Self {
        Self::new(vec![
            Box::new(SuccessHandler),
            Box::new(InvalidApiKeyHandler),
            Box::new(RateLimitHandler),
            Box::new(ServerErrorHandler),
            Box::new(ClientErrorHandler),
        ])
    }
}

impl std::fmt::Debug for HealthClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthClassifier")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(200, Verdict::Success)]
    #[case(201, Verdict::Success)]
    #[case(299, Verdict::Success)]
    #[case(429, Verdict::TransientFailure)]
    #[case(500, Verdict::TransientFailure)]
    #[case(502, Verdict::TransientFailure)]
    #[case(503, Verdict::TransientFailure)]
    #[case(504, Verdict::TransientFailure)]
    #[case(401, Verdict::DisqualifyingFailure)]
    #[case(403, Verdict::DisqualifyingFailure)]
    #[case(400, Verdict::ClientError)]
    #[case(404, Verdict::ClientError)]
    #[case(408, Verdict::ClientError)]
    #[case(413, Verdict::ClientError)]
    #[case(422, Verdict::ClientError)]
    #[case(501, Verdict::ClientError)]
    #[case(302, Verdict::Success)]
    fn classifies_status_codes(#[case] code: u16, #[case] expected: Verdict) {
        let classifier = HealthClassifier::default();
        let status = StatusCode::from_u16(code).unwrap();
        let body = Bytes::new();
        assert_eq!(
            classifier.classify(Outcome::Response { status, body: &body }),
            expected
        );
    }

    #[rstest]
    #[case(TransportError::Timeout)]
    #[case(TransportError::Connect("connection refused".into()))]
    #[case(TransportError::Other("stream reset".into()))]
    fn transport_errors_are_transient(#[case] err: TransportError) {
        let classifier = HealthClassifier::default();
        assert_eq!(
            classifier.classify(Outcome::Transport(&err)),
            Verdict::TransientFailure
        );
    }

    #[test]
    fn bad_request_with_invalid_key_payload_disqualifies() {
        let classifier = HealthClassifier::default();
        let body = Bytes::from_static(br#"{"error":{"code":"invalid_api_key"}}"#);
        assert_eq!(
            classifier.classify_response(StatusCode::BAD_REQUEST, &body),
            Verdict::DisqualifyingFailure
        );
    }

    #[test]
    fn empty_chain_falls_back_to_client_error() {
        let classifier = HealthClassifier::new(vec![]);
        assert_eq!(
            classifier.classify_response(StatusCode::OK, &Bytes::new()),
            Verdict::ClientError
        );
    }
}
