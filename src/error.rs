// src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Structured error body, shaped like the upstream API's own error envelope so
/// that OpenAI-compatible clients can parse it.
#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Serialize, Debug)]
struct ErrorDetails {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

/// Errors that can occur anywhere in the proxy.
///
/// Implements `IntoResponse` so handlers can return it directly; the mapping
/// to HTTP status lives in [`AppError::status_code`].
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid configuration: {message}")]
    ConfigInvalid {
        message: String,
        field: Option<String>,
    },

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String, line: Option<usize> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unknown key identifier. The pool is fixed at startup, so this means a bug.
    #[error("Key '{0}' not found in pool")]
    NotFound(String),

    #[error("No API key available")]
    NoKeyAvailable,

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Request body too large: {size} bytes (max: {max_size})")]
    RequestTooLarge { size: usize, max_size: usize },

    #[error("Request body processing error: {0}")]
    RequestBodyError(String),

    #[error("HTTP client build error: {0}")]
    HttpClientBuild(#[source] reqwest::Error),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("HTTP response builder error: {0}")]
    HttpResponseBuilder(#[from] axum::http::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn config_invalid(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoKeyAvailable | Self::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::RequestTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RequestBodyError(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ConfigInvalid { .. }
            | Self::ConfigNotFound { .. }
            | Self::ConfigParse { .. }
            | Self::Io(_)
            | Self::NotFound(_)
            | Self::HttpClientBuild(_)
            | Self::HttpResponseBuilder(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn to_details(&self) -> ErrorDetails {
        match self {
            Self::NoKeyAvailable => ErrorDetails {
                error_type: "NO_KEY_AVAILABLE".to_string(),
                message: "All API keys are currently unavailable. Try again later.".to_string(),
                details: None,
            },
            Self::UpstreamUnavailable(reason) => ErrorDetails {
                error_type: "UPSTREAM_UNAVAILABLE".to_string(),
                message: "The upstream service could not be reached".to_string(),
                details: Some(reason.clone()),
            },
            Self::RequestTooLarge { size, max_size } => ErrorDetails {
                error_type: "REQUEST_TOO_LARGE".to_string(),
                message: "Request body exceeds the configured limit".to_string(),
                details: Some(format!("{size} bytes (max: {max_size})")),
            },
            Self::RequestBodyError(msg) => ErrorDetails {
                error_type: "INVALID_REQUEST_BODY".to_string(),
                message: "Failed to read request body".to_string(),
                details: Some(msg.clone()),
            },
            Self::Unauthorized => ErrorDetails {
                error_type: "UNAUTHORIZED".to_string(),
                message: "Missing or invalid admin token".to_string(),
                details: None,
            },
            Self::ConfigInvalid { .. } | Self::ConfigNotFound { .. } | Self::ConfigParse { .. } => {
                ErrorDetails {
                    error_type: "CONFIG_ERROR".to_string(),
                    message: "Internal server configuration error".to_string(),
                    details: None,
                }
            }
            // Internal details are logged, never sent to the client.
            _ => ErrorDetails {
                error_type: "INTERNAL_SERVER_ERROR".to_string(),
                message: "An unexpected internal server error occurred".to_string(),
                details: None,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let body = ErrorResponse {
            error: self.to_details(),
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
