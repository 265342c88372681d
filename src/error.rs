//! HTTP-facing error type. Every failure leaves the gateway as
//! `{"error": "<message>"}` with a matching status code.

use axum::http::StatusCode;
use axum::response::{ IntoResponse, Response };
use axum::Json;
use log::error;
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;
use crate::history::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, malformed or rejected bearer token.
    #[error("{0}")]
    Unauthorized(String),

    /// The request body is missing required fields.
    #[error("{0}")]
    Validation(String),

    /// Only produced under the strict store failure policy.
    #[error("conversation store error: {0}")]
    Store(#[from] StoreError),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Unauthorized(err.client_message().to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
            ApiError::Validation(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::Store(e) => {
                error!("Store failure surfaced to caller: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "Conversation store is unavailable".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
