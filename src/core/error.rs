//! # Error Handling Module
//!
//! Error types for the discovery service built on `thiserror`.
//!
//! The sampler never surfaces errors: every failed OS read degrades to a zero
//! or partial reading inside the sampling cycle. Only the redirect path and
//! service bootstrap produce a [`DiscoveryError`], and the redirect errors map
//! onto `503 Service Unavailable` so that clients know to retry elsewhere.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Main result type used throughout the service
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Error types for the discovery service
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DiscoveryError {
    /// The registry reported zero healthy instances
    #[error("No active broker is available")]
    NoInstanceAvailable,

    /// The selected instance advertised an endpoint that cannot be redirected to
    #[error("Broker is not available: {endpoint} - {reason}")]
    BackendUnavailable { endpoint: String, reason: String },

    /// Configuration-related errors (invalid config, unreadable files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// I/O errors reading the configuration file
    #[error("I/O error: {message}")]
    Io { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl DiscoveryError {
    /// Create a backend unavailable error for the given endpoint data
    pub fn backend_unavailable<E: Into<String>, R: Into<String>>(endpoint: E, reason: R) -> Self {
        Self::BackendUnavailable {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoInstanceAvailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::BackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Yaml { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a string representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NoInstanceAvailable => "no_instance_available",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::Configuration { .. } => "configuration_error",
            Self::Io { .. } => "io_error",
            Self::Yaml { .. } => "yaml_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}

/// Implement conversion from std::io::Error
impl From<std::io::Error> for DiscoveryError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Implement conversion from serde_yaml::Error
impl From<serde_yaml::Error> for DiscoveryError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

/// Render errors as JSON bodies with the mapped status code
///
/// Redirect failures end up here, which is how a request with no reachable
/// broker turns into a `503` for the client.
impl IntoResponse for DiscoveryError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}
