// src/dispatch.rs

use crate::{
    error::{AppError, Result},
    handlers::{HealthClassifier, Outcome, Verdict},
    pool::{BlacklistManager, Clock, KeyRecord, KeySelector, KeyStore},
    proxy::{Forwarder, TransportError, UpstreamRequest, UpstreamResponse},
};
use axum::body::{Body, Bytes};
use futures_util::{future, stream, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Error bodies are classified on at most this many leading bytes. The caller
/// still receives the full body.
const MAX_ERROR_BODY_BYTES: usize = 1024 * 1024;

/// Result of a single upstream attempt after accounting has been recorded.
#[derive(Debug)]
enum Attempt {
    /// Terminal: hand the response back to the client.
    Done(UpstreamResponse),
    /// The key failed; the request may be retried on another key.
    Failed(Failure),
}

/// The last thing that went wrong, kept so exhaustion can surface it.
#[derive(Debug)]
enum Failure {
    Response {
        status: axum::http::StatusCode,
        headers: axum::http::HeaderMap,
        body: Body,
    },
    Transport(TransportError),
}

impl Failure {
    fn into_result(self) -> Result<UpstreamResponse> {
        match self {
            Self::Response {
                status,
                headers,
                body,
            } => Ok(UpstreamResponse {
                status,
                headers,
                body,
            }),
            Self::Transport(err) => Err(AppError::UpstreamUnavailable(err.to_string())),
        }
    }
}

/// Drives one inbound request through select → forward → classify → account,
/// retrying on a different key while the retry budget allows.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<KeyStore>,
    selector: KeySelector,
    blacklist: BlacklistManager,
    classifier: HealthClassifier,
    forwarder: Arc<dyn Forwarder>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
}

impl Dispatcher {
    pub fn new(
        store: Arc<KeyStore>,
        selector: KeySelector,
        blacklist: BlacklistManager,
        forwarder: Arc<dyn Forwarder>,
        clock: Arc<dyn Clock>,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            selector,
            blacklist,
            classifier: HealthClassifier::default(),
            forwarder,
            clock,
            max_retries,
        }
    }

    pub fn with_classifier(mut self, classifier: HealthClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Sends `request` upstream, rotating keys on key failures.
    ///
    /// At most `1 + max_retries` attempts are made and no key is tried twice.
    /// Each attempt runs in its own task, so an outcome that arrives after the
    /// caller went away still counts toward the key's health.
    #[instrument(level = "info", skip_all, fields(method = %request.method, path = %request.path_and_query))]
    pub async fn dispatch(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        let max_attempts = self.max_retries.saturating_add(1);
        let mut excluding: HashSet<String> = HashSet::new();
        let mut last_failure: Option<Failure> = None;

        for attempt in 1..=max_attempts {
            let key = match self.selector.select_key(&excluding) {
                Ok(key) => key,
                Err(AppError::NoKeyAvailable) => {
                    return match last_failure {
                        Some(failure) => {
                            warn!(attempt, "No untried key left, returning last upstream failure");
                            failure.into_result()
                        }
                        None => Err(AppError::NoKeyAvailable),
                    };
                }
                Err(e) => return Err(e),
            };
            excluding.insert(key.id().to_string());
            debug!(attempt, max_attempts, key.id = key.id(), "Dispatching attempt");

            let this = self.clone();
            let attempt_request = request.clone();
            let handle = tokio::spawn(async move { this.attempt(key, attempt_request).await });
            let outcome = handle.await.map_err(|e| {
                error!(error = %e, "Upstream attempt task failed");
                AppError::Internal(format!("upstream attempt aborted: {e}"))
            })??;

            match outcome {
                Attempt::Done(response) => return Ok(response),
                Attempt::Failed(failure) => last_failure = Some(failure),
            }
        }

        warn!(max_attempts, "Retry budget exhausted");
        match last_failure {
            Some(failure) => failure.into_result(),
            None => Err(AppError::NoKeyAvailable),
        }
    }

    async fn attempt(&self, key: Arc<KeyRecord>, request: UpstreamRequest) -> Result<Attempt> {
        let response = match self.forwarder.forward(&key, &request).await {
            Ok(response) => response,
            Err(err) => {
                let verdict = self.classifier.classify(Outcome::Transport(&err));
                warn!(key.id = key.id(), error = %err, "Upstream transport failure");
                self.record(key.id(), verdict)?;
                return Ok(Attempt::Failed(Failure::Transport(err)));
            }
        };

        // Success bodies stream straight through; only non-2xx bodies are read.
        if response.status.is_success() {
            let verdict = self
                .classifier
                .classify_response(response.status, &Bytes::new());
            self.record(key.id(), verdict)?;
            return Ok(Attempt::Done(response));
        }

        let UpstreamResponse {
            status,
            headers,
            body,
        } = response;
        let (prefix, body) = match read_prefix(body, MAX_ERROR_BODY_BYTES).await {
            Ok(read) => read,
            Err(e) => {
                let err = TransportError::Other(e.to_string());
                warn!(key.id = key.id(), %status, error = %err, "Failed to read upstream error body");
                self.record(key.id(), Verdict::TransientFailure)?;
                return Ok(Attempt::Failed(Failure::Transport(err)));
            }
        };

        let verdict = self.classifier.classify(Outcome::Response {
            status,
            body: &prefix,
        });
        self.record(key.id(), verdict)?;
        debug!(key.id = key.id(), %status, ?verdict, "Classified upstream response");

        if verdict.is_key_failure() {
            Ok(Attempt::Failed(Failure::Response {
                status,
                headers,
                body,
            }))
        } else {
            Ok(Attempt::Done(UpstreamResponse {
                status,
                headers,
                body,
            }))
        }
    }

    /// Applies a verdict to the key's counters and quarantine state.
    fn record(&self, id: &str, verdict: Verdict) -> Result<()> {
        let now = self.clock.now();
        match verdict {
            Verdict::Success | Verdict::ClientError => {
                self.store.update(id, |rt| rt.record_success())?;
            }
            Verdict::TransientFailure => {
                let consecutive = self.store.update(id, |rt| rt.record_failure(now))?;
                if self.blacklist.policy().threshold_reached(consecutive) {
                    info!(key.id = id, consecutive, "Failure threshold reached");
                    self.blacklist.blacklist_with_backoff(id)?;
                }
            }
            Verdict::DisqualifyingFailure => {
                self.store.update(id, |rt| rt.record_failure(now))?;
                self.blacklist.disqualify(id)?;
            }
        }
        Ok(())
    }
}

/// Reads up to `limit` leading bytes of `body`. Returns them together with a
/// body that replays the same bytes followed by whatever was not read yet.
async fn read_prefix(body: Body, limit: usize) -> std::result::Result<(Bytes, Body), axum::Error> {
    let mut chunks = body.into_data_stream();
    let mut buffered = Vec::new();
    while buffered.len() < limit {
        match chunks.next().await {
            Some(chunk) => buffered.extend_from_slice(&chunk?),
            None => {
                let prefix = Bytes::from(buffered);
                return Ok((prefix.clone(), Body::from(prefix)));
            }
        }
    }

    let prefix = Bytes::from(buffered);
    let replay = stream::once(future::ready(Ok::<_, axum::Error>(prefix.clone()))).chain(chunks);
    Ok((prefix, Body::from_stream(replay)))
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("keys", &self.store.len())
            .field("max_retries", &self.max_retries)
            .finish()
    }
}
