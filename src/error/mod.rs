use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Rejections produced by the relay core. Each variant has a stable wire code
/// carried in acknowledgments and HTTP error bodies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("caller is not authorized to emit events")]
    NotAuthorized,

    #[error("connection is not bound to a tenant")]
    NotBound,

    #[error("target tenant does not match the caller's tenant")]
    TenantMismatch,

    #[error("unrecognized event: {0}")]
    InvalidEvent(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("broadcast bus unavailable: {0}")]
    Unavailable(String),
}

impl RelayError {
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::AuthFailed(_) => "auth_failed",
            RelayError::NotAuthorized => "not_authorized",
            RelayError::NotBound => "not_bound",
            RelayError::TenantMismatch => "tenant_mismatch",
            RelayError::InvalidEvent(_) => "invalid_event",
            RelayError::InvalidTarget(_) => "invalid_target",
            RelayError::Unavailable(_) => "unavailable",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            RelayError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Relay(e) => (e.status(), e.code(), e.to_string()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "invalid_request", msg.clone()),
            AppError::Config(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                e.to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(code = %code, status = %status.as_u16(), message = %message, "API error");
        } else {
            tracing::debug!(code = %code, status = %status.as_u16(), message = %message, "API request rejected");
        }

        let body = ErrorResponse {
            error: code.to_string(),
            message: (!is_production()).then_some(message),
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_error_codes() {
        assert_eq!(RelayError::AuthFailed("x".into()).code(), "auth_failed");
        assert_eq!(RelayError::NotAuthorized.code(), "not_authorized");
        assert_eq!(RelayError::NotBound.code(), "not_bound");
        assert_eq!(RelayError::TenantMismatch.code(), "tenant_mismatch");
        assert_eq!(RelayError::InvalidEvent("x".into()).code(), "invalid_event");
        assert_eq!(RelayError::InvalidTarget("x".into()).code(), "invalid_target");
    }

    #[test]
    fn test_relay_error_status() {
        assert_eq!(
            RelayError::AuthFailed("bad".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(RelayError::TenantMismatch.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_app_error_response_status() {
        let response = AppError::from(RelayError::NotAuthorized).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AppError::Validation("missing user_id".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
