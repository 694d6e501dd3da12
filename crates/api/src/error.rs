//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The caller did not present a usable identity.
    #[error("missing or invalid user identity")]
    Unauthorized,

    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),

    /// Checkout or cart error.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({ "error": ApiError::Unauthorized.to_string() }),
            ),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
            }
            ApiError::Domain(err) => domain_error_to_response(err),
        };

        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, serde_json::Value) {
    let message = err.to_string();
    match err {
        DomainError::NotFound { .. } => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": message }),
        ),
        DomainError::EmptyCart => (
            StatusCode::UNPROCESSABLE_ENTITY,
            serde_json::json!({ "error": message }),
        ),
        DomainError::InsufficientStock {
            product_id,
            requested,
            available,
        } => (
            StatusCode::CONFLICT,
            serde_json::json!({
                "error": message,
                "product_id": product_id,
                "requested": requested,
                "available": available,
            }),
        ),
        DomainError::Validation(_) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": message }),
        ),
        DomainError::Persistence(cause) => {
            tracing::error!(error = %cause, "persistence failure");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({ "error": "service temporarily unavailable" }),
            )
        }
    }
}
