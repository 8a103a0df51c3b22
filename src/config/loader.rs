// src/config/loader.rs

use crate::config::{preview_secret, AppConfig, ConfigValidator, KeyEntry};
use crate::error::{AppError, Result};
use secrecy::ExposeSecret;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Values coming from the command line; they win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Load configuration from file (if present), extra key sources, environment
/// variables and CLI overrides, then validate the result.
pub fn load_config(config_path: &Path, overrides: &ConfigOverrides) -> Result<AppConfig> {
    let mut config = if config_path.exists() {
        info!("Loading configuration from file: {}", config_path.display());
        load_from_file(config_path)?
    } else {
        info!("Configuration file not found, using defaults");
        AppConfig::default()
    };

    if let Some(resolved) = keys_file_path(config_path, &config) {
        let keys_file = load_keys_file(&resolved)?;
        append_secrets(&mut config, keys_file.secrets, "keys_file");
    }

    override_with_env(&mut config);
    apply_overrides(&mut config, overrides);

    ConfigValidator::validate(&config)?;

    debug!("Configuration loaded and validated successfully");
    Ok(config)
}

fn load_from_file(config_path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(config_path).map_err(|_| AppError::ConfigNotFound {
        path: config_path.display().to_string(),
    })?;

    serde_yaml::from_str(&content).map_err(|e| AppError::ConfigParse {
        message: format!("Failed to parse config file: {e}"),
        line: e.location().map(|loc| loc.line()),
    })
}

fn resolve_relative(config_path: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        return target.to_path_buf();
    }
    config_path
        .parent()
        .map_or_else(|| target.to_path_buf(), |dir| dir.join(target))
}

/// Where `config.keys_file` points, relative paths resolved next to the config file.
pub fn keys_file_path(config_path: &Path, config: &AppConfig) -> Option<PathBuf> {
    config
        .keys_file
        .as_deref()
        .map(|keys_file| resolve_relative(config_path, keys_file))
}

/// Secrets read from a keys file, plus the repeats that were dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeysFile {
    pub secrets: Vec<String>,
    pub duplicates: Vec<String>,
}

/// Reads one secret per line. Blank lines and `#` comments are skipped,
/// repeated secrets are dropped.
pub fn load_keys_file(path: &Path) -> Result<KeysFile> {
    let content = std::fs::read_to_string(path).map_err(|_| AppError::ConfigNotFound {
        path: path.display().to_string(),
    })?;

    let mut seen = HashSet::new();
    let mut secrets = Vec::new();
    let mut duplicates = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if seen.insert(line.to_string()) {
            secrets.push(line.to_string());
        } else {
            duplicates.push(line.to_string());
        }
    }

    if !duplicates.is_empty() {
        warn!(path = %path.display(), duplicates = duplicates.len(), "Dropped duplicate keys from keys file");
    }
    info!(path = %path.display(), count = secrets.len(), "Loaded keys from file");
    Ok(KeysFile {
        secrets,
        duplicates,
    })
}

fn append_secrets(config: &mut AppConfig, secrets: Vec<String>, source: &str) {
    let known: HashSet<String> = config
        .keys
        .iter()
        .map(|k| k.secret.expose_secret().clone())
        .collect();
    let before = config.keys.len();
    config.keys.extend(
        secrets
            .into_iter()
            .filter(|s| !known.contains(s))
            .map(KeyEntry::new),
    );
    debug!(source, added = config.keys.len() - before, "Appended keys");
}

fn override_with_env(config: &mut AppConfig) {
    if let Ok(host) = std::env::var("KEYPOOL_HOST") {
        info!("Overriding server host from environment variable: {}", host);
        config.server.host = host;
    }

    if let Some(port_str) = std::env::var("KEYPOOL_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
    {
        if let Ok(port) = port_str.parse::<u16>() {
            info!("Overriding server port from environment variable: {}", port);
            config.server.port = port;
        } else {
            warn!("Invalid port environment variable: {}", port_str);
        }
    }

    if let Ok(url) = std::env::var("KEYPOOL_UPSTREAM_URL") {
        info!("Overriding upstream URL from environment variable");
        config.upstream.base_url = url;
    }

    if let Ok(token) = std::env::var("KEYPOOL_ADMIN_TOKEN") {
        config.server.admin_token = Some(token);
    }

    if let Ok(keys) = std::env::var("KEYPOOL_KEYS") {
        let secrets = keys
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        append_secrets(config, secrets, "KEYPOOL_KEYS");
    }

    if let Ok(value) = std::env::var("KEYPOOL_MAX_RETRIES") {
        match value.parse::<u32>() {
            Ok(retries) => config.pool.max_retries = retries,
            Err(_) => warn!("Invalid KEYPOOL_MAX_RETRIES environment variable: {}", value),
        }
    }

    if let Ok(value) = std::env::var("KEYPOOL_FAILURE_THRESHOLD") {
        match value.parse::<u32>() {
            Ok(threshold) => config.pool.failure_threshold = threshold,
            Err(_) => warn!("Invalid KEYPOOL_FAILURE_THRESHOLD environment variable: {}", value),
        }
    }
}

fn apply_overrides(config: &mut AppConfig, overrides: &ConfigOverrides) {
    if let Some(host) = &overrides.host {
        config.server.host = host.clone();
    }
    if let Some(port) = overrides.port {
        config.server.port = port;
    }
}

/// Logs the effective configuration at startup. Secrets only appear masked.
pub fn log_config_summary(config: &AppConfig) {
    let previews: Vec<String> = config
        .resolved_keys()
        .into_iter()
        .map(|(id, entry)| format!("{id}({})", preview_secret(entry.secret.expose_secret())))
        .collect();
    info!(
        server.host = %config.server.host,
        server.port = config.server.port,
        upstream = %config.upstream.base_url,
        keys.count = config.keys.len(),
        keys = ?previews,
        pool.failure_threshold = config.pool.failure_threshold,
        pool.backoff_base_secs = config.pool.backoff_base_secs,
        pool.backoff_max_secs = config.pool.backoff_max_secs,
        pool.max_retries = config.pool.max_retries,
        admin_token = config.server.admin_token.is_some(),
        "Effective configuration"
    );
}
