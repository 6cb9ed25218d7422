//! HTTP error handling.
//!
//! An HTTP-aware `AppError{status, message}` wrapper around the
//! transport-agnostic `tty_agent_core::GatewayError`, with builder methods
//! for the handful of status codes this surface actually returns.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tty_agent_core::GatewayError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

/// Wire shape for every error response on this surface: `400/413/500
/// {ok:false,error}`.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    ok: bool,
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            ok: false,
            error: self.message,
        });
        (status, body).into_response()
    }
}

/// Maps the subset of `GatewayError` variants the `/ws-ticket` handler can
/// actually produce. Variants that only ever occur mid-session
/// (`NoShellFound`, `ExecFailed`, `Kube`, `Io`) surface as `ServerFrame::Error`
/// over the WebSocket instead, never through this conversion in practice,
/// but are still mapped sanely in case a future handler returns one.
impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidInput(msg) => Self::bad_request(msg),
            GatewayError::TicketInvalid | GatewayError::TicketUsed | GatewayError::TicketExpired => {
                Self::bad_request(err.to_string())
            }
            GatewayError::PayloadTooLarge | GatewayError::KubeconfigTooLarge => {
                Self::payload_too_large(err.to_string())
            }
            GatewayError::Serialization(e) => {
                tracing::warn!(error = %e, "request body failed to deserialize");
                Self::bad_request("Invalid request body")
            }
            GatewayError::NoShellFound(_) | GatewayError::ExecFailed(_) | GatewayError::Kube(_)
            | GatewayError::Io(_) | GatewayError::Internal(_) => {
                tracing::error!(error = %err, "internal gateway error");
                Self::internal_server_error("Internal server error")
            }
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::warn!(error = %err, "JSON error");
        Self::bad_request("Invalid request data format")
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "unexpected error");
        Self::internal_server_error("Internal server error")
    }
}
