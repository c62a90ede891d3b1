//! API error types and response handling.
//!
//! This module provides a unified error type for all API handlers
//! with automatic conversion to appropriate HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
///
/// Each variant maps to a specific HTTP status code and produces a
/// consistent JSON error response.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 400 Bad Request - Invalid input from client.
    BadRequest {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 404 Not Found - Resource does not exist.
    NotFound {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 409 Conflict - Operation cannot be completed in the current link state.
    Conflict {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 500 Internal Server Error - Unexpected server-side error.
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional details (not exposed to client in production).
        details: Option<String>,
    },

    /// 502 Bad Gateway - The ring dropped the link or refused the connection.
    BadGateway {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 503 Service Unavailable - Bluetooth hardware is unavailable.
    ServiceUnavailable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional additional details.
        details: Option<String>,
    },

    /// 504 Gateway Timeout - The ring did not answer within the deadline.
    GatewayTimeout {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "invalid_request",
    "message": "The provided value is not valid",
    "details": null
}))]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "link_unavailable").
    #[schema(example = "invalid_request")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "The provided value is not valid")]
    pub message: String,

    /// Optional additional details for debugging.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            Self::BadRequest {
                error_code,
                message,
            } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                },
            ),

            Self::NotFound {
                error_code,
                message,
            } => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                },
            ),

            Self::Conflict {
                error_code,
                message,
            } => (
                StatusCode::CONFLICT,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                },
            ),

            Self::InternalError {
                error_code,
                message,
                details,
            } => {
                // Log internal errors
                tracing::error!(
                    error_code = %error_code,
                    message = %message,
                    details = ?details,
                    "Internal server error"
                );

                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: error_code,
                        message,
                        details: details.map(|d| serde_json::json!(d)),
                    },
                )
            }

            Self::BadGateway {
                error_code,
                message,
            } => (
                StatusCode::BAD_GATEWAY,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                },
            ),

            Self::ServiceUnavailable {
                error_code,
                message,
                details,
            } => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: details.map(|d| serde_json::json!(d)),
                },
            ),

            Self::GatewayTimeout {
                error_code,
                message,
            } => (
                StatusCode::GATEWAY_TIMEOUT,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                },
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest { message, .. } => write!(f, "Bad Request: {message}"),
            Self::NotFound { message, .. } => write!(f, "Not Found: {message}"),
            Self::Conflict { message, .. } => write!(f, "Conflict: {message}"),
            Self::InternalError { message, .. } => write!(f, "Internal Error: {message}"),
            Self::BadGateway { message, .. } => write!(f, "Bad Gateway: {message}"),
            Self::ServiceUnavailable { message, .. } => {
                write!(f, "Service Unavailable: {message}")
            }
            Self::GatewayTimeout { message, .. } => write!(f, "Gateway Timeout: {message}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// Convert from ringd_core errors.
impl From<ringd_core::RingdError> for ApiError {
    fn from(err: ringd_core::RingdError) -> Self {
        use ringd_core::RingdError;

        let error_code = err.error_code().to_ascii_lowercase();
        match &err {
            RingdError::LinkUnavailable => Self::Conflict {
                error_code,
                message: err.to_string(),
            },
            RingdError::TimedOut { .. } => Self::GatewayTimeout {
                error_code,
                message: err.to_string(),
            },
            RingdError::LinkLost | RingdError::ConnectFailed { .. } => Self::BadGateway {
                error_code,
                message: err.to_string(),
            },
            RingdError::AdapterNotFound | RingdError::ScanFailed(_) => Self::ServiceUnavailable {
                error_code,
                message: err.to_string(),
                details: None,
            },
            RingdError::DeviceNotFound(_) => Self::NotFound {
                error_code,
                message: err.to_string(),
            },
            RingdError::InvalidAddress(_) => Self::BadRequest {
                error_code,
                message: err.to_string(),
            },
            RingdError::ConfigNotFound(_)
            | RingdError::ConfigParseError(_)
            | RingdError::ConfigValidationError(_)
            | RingdError::PersistenceError(_)
            | RingdError::IoError(_) => Self::InternalError {
                error_code,
                message: err.to_string(),
                details: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringd_core::{MetricKind, RingdError};

    #[test]
    fn test_bad_request_error() {
        let err = ApiError::BadRequest {
            error_code: "test_error".to_string(),
            message: "Test message".to_string(),
        };
        assert!(err.to_string().contains("Bad Request"));
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse {
            error: "test_error".to_string(),
            message: "Test message".to_string(),
            details: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test_error"));
    }

    #[test]
    fn test_core_error_mapping() {
        let err = ApiError::from(RingdError::LinkUnavailable);
        assert!(matches!(err, ApiError::Conflict { .. }));

        let err = ApiError::from(RingdError::TimedOut {
            kind: MetricKind::HeartRate,
        });
        assert!(matches!(err, ApiError::GatewayTimeout { .. }));

        let err = ApiError::from(RingdError::LinkLost);
        assert!(matches!(err, ApiError::BadGateway { .. }));

        let err = ApiError::from(RingdError::AdapterNotFound);
        assert!(matches!(err, ApiError::ServiceUnavailable { .. }));

        let err = ApiError::from(RingdError::InvalidAddress("x".into()));
        assert!(matches!(err, ApiError::BadRequest { .. }));
    }
}
