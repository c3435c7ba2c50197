//! Error types for authrelay
//!
//! Two families live here:
//! - `AppError`: infrastructure failures (configuration, outbound client
//!   setup, unknown routes). Implements `IntoResponse` with a JSON body.
//! - `InitError`: the closed set of ways an OAuth initiation can fail.
//!   These never reach the browser as an error status; the initiation
//!   handler turns every one of them into an error redirect.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Fallback text when a failure carries no description.
pub const UNKNOWN_ERROR_DESCRIPTION: &str = "Unknown error";

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// HTTP client error (502)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl IntoResponse for AppError {
    /// Maps each error variant to an HTTP status code and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message, error_type) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string(), "not_found"),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, self.to_string(), "http_client"),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "config"),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "internal",
            ),
        };

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL
            .with_label_values(&[error_type, "unknown"])
            .inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Why an OAuth initiation did not produce a provider redirect.
///
/// Each variant carries the human-readable text that ends up in the
/// `error_description` query parameter of the error redirect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    /// The request named something the relay refuses to forward.
    #[error("{0}")]
    MalformedInput(String),

    /// The authority could not be reached, or did not answer in time.
    #[error("{0}")]
    DelegationUnreachable(String),

    /// The authority answered with a failure status or an unreadable body.
    #[error("{0}")]
    DelegationRejected(String),

    /// The authority answered but reported an application-level error.
    #[error("{0}")]
    AuthorityError(String),
}

impl InitError {
    /// Text for `error_description`, never empty.
    pub fn description(&self) -> &str {
        let text = match self {
            InitError::MalformedInput(text)
            | InitError::DelegationUnreachable(text)
            | InitError::DelegationRejected(text)
            | InitError::AuthorityError(text) => text.trim(),
        };

        if text.is_empty() {
            UNKNOWN_ERROR_DESCRIPTION
        } else {
            text
        }
    }

    /// Stable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            InitError::MalformedInput(_) => "malformed_input",
            InitError::DelegationUnreachable(_) => "delegation_unreachable",
            InitError::DelegationRejected(_) => "delegation_rejected",
            InitError::AuthorityError(_) => "authority_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_renders_json_body() {
        let response = AppError::NotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn description_falls_back_when_empty() {
        let error = InitError::DelegationUnreachable("   ".to_string());
        assert_eq!(error.description(), UNKNOWN_ERROR_DESCRIPTION);
    }

    #[test]
    fn description_keeps_authority_message() {
        let error = InitError::AuthorityError("provider_disabled".to_string());
        assert_eq!(error.description(), "provider_disabled");
        assert_eq!(error.kind(), "authority_error");
    }
}
