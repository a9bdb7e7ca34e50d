//! HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use screener_common::Error;

/// Error body carried under `error`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Handler error wrapping the shared error type.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self(Error::InvalidInput(message.into()))
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "Request failed");
        } else {
            tracing::debug!(code = self.0.code(), error = %self.0, "Request rejected");
        }

        let body = serde_json::json!({
            "success": false,
            "error": ErrorBody {
                code: self.0.code().to_string(),
                message: self.0.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
