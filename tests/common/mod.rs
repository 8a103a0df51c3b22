//! Common test utilities and fixtures

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use keypool_proxy::{
    config::{AppConfig, KeyEntry},
    create_router, AppState,
};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Test configuration builder
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_key(mut self, id: &str, secret: &str) -> Self {
        self.config.keys.push(KeyEntry::with_id(id, secret));
        self
    }

    pub fn with_upstream(mut self, base_url: impl Into<String>) -> Self {
        self.config.upstream.base_url = base_url.into();
        self
    }

    pub fn with_admin_token(mut self, token: &str) -> Self {
        self.config.server.admin_token = Some(token.to_string());
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.config.pool.failure_threshold = threshold;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.config.pool.max_retries = retries;
        self
    }

    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.config.server.max_body_bytes = bytes;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Router plus a handle on the state behind it, for assertions.
pub fn test_app(config: AppConfig) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(config).expect("Failed to create AppState for test"));
    (create_router(Arc::clone(&state)), state)
}

pub fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(method: Method, uri: &str, body: &serde_json::Value) -> Request<Body> {
    let body = body.to_string();
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("content-length", body.len())
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body")
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("Response body is not JSON")
}

/// Writes `content` to `name` inside `dir` and returns the full path.
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("Failed to write test file");
    path
}
