// src/config/validation.rs

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use secrecy::ExposeSecret;
use std::collections::HashSet;
use tracing::{debug, warn};
use url::Url;

/// Upper bound for a single quarantine; keeps deadline arithmetic far from overflow.
const MAX_BACKOFF_SECS: u64 = 7 * 24 * 60 * 60;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &AppConfig) -> Result<()> {
        debug!("Starting configuration validation");

        if let Err(e) = Self::validate_keys(config) {
            warn!("Key validation failed: {}", e);
            return Err(e);
        }
        debug!("Key validation passed");

        if let Err(e) = Self::validate_upstream(config) {
            warn!("Upstream config validation failed: {}", e);
            return Err(e);
        }

        if let Err(e) = Self::validate_server_config(config) {
            warn!("Server config validation failed: {}", e);
            return Err(e);
        }

        if let Err(e) = Self::validate_pool_policy(config) {
            warn!("Pool policy validation failed: {}", e);
            return Err(e);
        }

        debug!("Configuration validation completed successfully");
        Ok(())
    }

    fn validate_keys(config: &AppConfig) -> Result<()> {
        if config.keys.is_empty() {
            return Err(AppError::config_invalid(
                "At least one API key must be configured",
                Some("keys"),
            ));
        }

        let mut ids = HashSet::new();
        let mut secrets = HashSet::new();

        for (id, entry) in config.resolved_keys() {
            let secret = entry.secret.expose_secret();
            if secret.trim().is_empty() {
                return Err(AppError::config_invalid(
                    format!("Key '{id}' has an empty secret"),
                    Some("keys.secret"),
                ));
            }
            if !secrets.insert(secret.as_str()) {
                return Err(AppError::config_invalid(
                    format!("Duplicate API key secret for key '{id}'"),
                    Some("keys.secret"),
                ));
            }
            if !ids.insert(id.clone()) {
                return Err(AppError::config_invalid(
                    format!("Duplicate key identifier: {id}"),
                    Some("keys.id"),
                ));
            }
        }

        debug!("Validated {} keys", ids.len());
        Ok(())
    }

    fn validate_upstream(config: &AppConfig) -> Result<()> {
        let url = Url::parse(&config.upstream.base_url).map_err(|e| {
            AppError::config_invalid(
                format!("Invalid upstream URL {}: {}", config.upstream.base_url, e),
                Some("upstream.base_url"),
            )
        })?;

        match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(AppError::config_invalid(
                format!("Unsupported upstream scheme '{scheme}'. Supported: http, https"),
                Some("upstream.base_url"),
            )),
        }
    }

    fn validate_server_config(config: &AppConfig) -> Result<()> {
        let server = &config.server;
        if server.host.trim().is_empty() {
            return Err(AppError::config_invalid(
                "Server host cannot be empty",
                Some("server.host"),
            ));
        }

        if server.port == 0 {
            return Err(AppError::config_invalid(
                "Server port cannot be 0",
                Some("server.port"),
            ));
        }

        if server.connect_timeout_secs == 0 {
            return Err(AppError::config_invalid(
                "Connect timeout cannot be 0",
                Some("server.connect_timeout_secs"),
            ));
        }

        if server.request_timeout_secs == 0 {
            return Err(AppError::config_invalid(
                "Request timeout cannot be 0",
                Some("server.request_timeout_secs"),
            ));
        }

        if server.max_body_bytes == 0 {
            return Err(AppError::config_invalid(
                "Maximum body size cannot be 0",
                Some("server.max_body_bytes"),
            ));
        }

        Ok(())
    }

    fn validate_pool_policy(config: &AppConfig) -> Result<()> {
        let pool = &config.pool;
        if pool.failure_threshold == 0 {
            return Err(AppError::config_invalid(
                "Failure threshold must be at least 1",
                Some("pool.failure_threshold"),
            ));
        }

        if pool.backoff_base_secs == 0 {
            return Err(AppError::config_invalid(
                "Backoff base cannot be 0",
                Some("pool.backoff_base_secs"),
            ));
        }

        if pool.backoff_max_secs < pool.backoff_base_secs {
            return Err(AppError::config_invalid(
                format!(
                    "Backoff cap ({}s) is smaller than backoff base ({}s)",
                    pool.backoff_max_secs, pool.backoff_base_secs
                ),
                Some("pool.backoff_max_secs"),
            ));
        }

        if pool.backoff_max_secs > MAX_BACKOFF_SECS {
            return Err(AppError::config_invalid(
                format!("Backoff cap cannot exceed {MAX_BACKOFF_SECS}s"),
                Some("pool.backoff_max_secs"),
            ));
        }

        Ok(())
    }
}
