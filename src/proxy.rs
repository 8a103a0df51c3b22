// src/proxy.rs

use crate::{
    config::AppConfig,
    error::{AppError, Result},
    pool::KeyRecord,
    state::AppState,
};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::Response,
};
use http_body_util::LengthLimitError;
use reqwest::Client;
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, trace, warn};

// Hop-by-hop headers that should not be forwarded
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
    // Replaced by the pool key
    "authorization",
    "api-key",
];

/// A buffered client request, ready to be replayed against the upstream with
/// different keys.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamRequest {
    pub fn new(method: Method, path_and_query: impl Into<String>) -> Self {
        Self {
            method,
            path_and_query: path_and_query.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// What the upstream answered. The body may still be streaming.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, body: impl Into<Body>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn into_response(self) -> Response {
        let mut response = Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// The upstream could not be reached or did not answer in time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("upstream request timed out")]
    Timeout,
    #[error("failed to connect to upstream: {0}")]
    Connect(String),
    #[error("upstream transport error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

/// Sends one request upstream using one key.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(
        &self,
        key: &KeyRecord,
        request: &UpstreamRequest,
    ) -> std::result::Result<UpstreamResponse, TransportError>;
}

/// [`Forwarder`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    client: Client,
    base_url: String,
}

impl HttpForwarder {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.server.connect_timeout_secs))
            .timeout(Duration::from_secs(config.server.request_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(config.keys.len().max(10))
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .build()
            .map_err(AppError::HttpClientBuild)?;
        info!(upstream = %config.upstream.base_url, "HTTP client created");

        Ok(Self {
            client,
            base_url: config.upstream.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn target_url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    #[instrument(level = "debug", skip_all, fields(key.id = key.id(), method = %request.method))]
    async fn forward(
        &self,
        key: &KeyRecord,
        request: &UpstreamRequest,
    ) -> std::result::Result<UpstreamResponse, TransportError> {
        let url = self.target_url(&request.path_and_query);
        let headers = build_forward_headers(&request.headers, key.secret().expose_secret());

        debug!(url = %url, key.preview = %key.preview(), "Forwarding request to upstream");
        let upstream = self
            .client
            .request(request.method.clone(), &url)
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await?;

        let status = upstream.status();
        debug!(status = %status, "Received response from upstream");
        let headers = build_response_headers(upstream.headers());

        Ok(UpstreamResponse {
            status,
            headers,
            body: Body::from_stream(upstream.bytes_stream()),
        })
    }
}

/// Creates the outgoing header set: the client's headers minus hop-by-hop and
/// auth headers, plus `Authorization: Bearer <key>`.
fn build_forward_headers(original_headers: &HeaderMap, api_key: &str) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(original_headers.len() + 1);
    copy_non_hop_by_hop_headers(original_headers, &mut filtered);
    match HeaderValue::from_str(&format!("Bearer {api_key}")) {
        Ok(mut value) => {
            value.set_sensitive(true);
            filtered.insert(header::AUTHORIZATION, value);
        }
        Err(e) => {
            warn!(error = %e, "Failed to create Authorization header (invalid characters in key?)");
        }
    }
    filtered
}

fn build_response_headers(original_headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(original_headers.len());
    copy_non_hop_by_hop_headers(original_headers, &mut filtered);
    filtered
}

fn copy_non_hop_by_hop_headers(source: &HeaderMap, dest: &mut HeaderMap) {
    for (name, value) in source {
        if HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
            trace!(header = %name, "Skipping hop-by-hop or auth header");
        } else {
            dest.append(name.clone(), value.clone());
        }
    }
}

fn exceeds_length_limit(err: &axum::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

/// Fallback handler: everything that is not an introspection route goes upstream.
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response> {
    let (parts, body) = request.into_parts();
    let max_body = state.config.server.max_body_bytes;
    // Declared lengths are rejected earlier by the size-limit middleware.
    let body = to_bytes(body, max_body).await.map_err(|e| {
        if exceeds_length_limit(&e) {
            warn!(max_size = max_body, "Request rejected: streamed body exceeds limit");
            AppError::RequestTooLarge {
                size: max_body + 1,
                max_size: max_body,
            }
        } else {
            AppError::RequestBodyError(e.to_string())
        }
    })?;

    let path_and_query = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_string(), |pq| pq.as_str().to_string());

    let upstream_request = UpstreamRequest {
        method: parts.method,
        path_and_query,
        headers: parts.headers,
        body,
    };

    let response = state.dispatcher.dispatch(upstream_request).await?;
    Ok(response.into_response())
}
