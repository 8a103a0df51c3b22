// src/config/app.rs

use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::Duration;

/// One configured credential. `id` is optional in the file; a stable one is
/// derived from the secret when absent.
#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct KeyEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(serialize_with = "serialize_redacted")]
    pub secret: Secret<String>,
}

impl KeyEntry {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            id: None,
            secret: Secret::new(secret.into()),
        }
    }

    pub fn with_id(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            secret: Secret::new(secret.into()),
        }
    }

    /// The identifier this key is known by in the pool.
    pub fn identifier(&self) -> String {
        match &self.id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => derive_key_id(self.secret.expose_secret()),
        }
    }
}

impl PartialEq for KeyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.secret.expose_secret() == other.secret.expose_secret()
    }
}

fn serialize_redacted<S: Serializer>(secret: &Secret<String>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&preview_secret(secret.expose_secret()))
}

/// `key-` followed by the first 12 hex chars of the secret's SHA-256.
pub fn derive_key_id(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    format!("key-{}", &hex::encode(digest)[..12])
}

/// Masked form of a secret, safe for logs and reports.
pub fn preview_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() > 12 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "***".to_string()
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
            max_body_bytes: default_max_body_bytes(),
            admin_token: None,
        }
    }
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub base_url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_url(),
        }
    }
}

/// Blacklist and retry policy for the key pool.
#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
pub struct PoolConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            backoff_base_secs: default_backoff_base(),
            backoff_max_secs: default_backoff_max(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub keys: Vec<KeyEntry>,
    #[serde(default)]
    pub keys_file: Option<PathBuf>,
    #[serde(default)]
    pub pool: PoolConfig,
}

impl AppConfig {
    /// Keys in pool order, paired with their resolved identifiers.
    pub fn resolved_keys(&self) -> Vec<(String, &KeyEntry)> {
        self.keys.iter().map(|k| (k.identifier(), k)).collect()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    300
}

fn default_shutdown_grace() -> u64 {
    10
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_upstream_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    30
}

fn default_backoff_max() -> u64 {
    30 * 60
}

fn default_max_retries() -> u32 {
    2
}
