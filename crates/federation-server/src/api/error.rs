//! API error types and responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use federation_client::ClientError;
use federation_core::FederationError;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// A federation endpoint we depend on failed or served garbage
    #[error("Upstream failure: {0}")]
    BadGateway(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "BAD_GATEWAY", msg),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<FederationError> for ApiError {
    fn from(err: FederationError) -> Self {
        match err {
            FederationError::InvalidEntityIdentifier(msg) => {
                ApiError::BadRequest(format!("Invalid entity identifier: {}", msg))
            }
            other => ApiError::BadGateway(other.to_string()),
        }
    }
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Federation(inner) => inner.into(),
            ClientError::Configuration(msg) => ApiError::Internal(msg),
            other => ApiError::BadGateway(other.to_string()),
        }
    }
}
