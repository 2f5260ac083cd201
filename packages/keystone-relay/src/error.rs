//! HTTP mapping of core errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use keystone_core::{Error, ErrorKind};
use serde_json::json;

/// A core error on its way to the client.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// Status code the client sees.
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::KeyknoxConflict => StatusCode::CONFLICT,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::CardNotFound(_) | Error::EntryNotFound(_) | Error::KeyNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            err => match err.kind() {
                ErrorKind::MalformedInput
                | ErrorKind::ProtocolViolation
                | ErrorKind::TrustViolation
                | ErrorKind::CryptoFailure
                | ErrorKind::Storage => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.0.code(), "Request failed: {}", self.0);
        } else {
            tracing::debug!(code = self.0.code(), "Request rejected: {}", self.0);
        }

        (
            status,
            Json(json!({
                "code": self.0.code(),
                "error": self.0.to_string(),
            })),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
