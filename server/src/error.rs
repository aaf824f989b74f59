use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authorisation denial. Always rendered as the same generic message
    /// regardless of the internal cause (missing membership, missing parent
    /// resource, read-only restriction).
    #[error("Not authorised")]
    AccessDenied,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Entity failed field constraints; carries one message per violation.
    #[error("Validation failed: {0:?}")]
    Validation(Vec<String>),

    /// CSV header/row-shape/email-syntax problem; one human-readable message.
    #[error("CSV upload error. {0}")]
    ImportFormat(String),

    #[error("Document conversion failed: {0}")]
    Conversion(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::AccessDenied => {
                (StatusCode::FORBIDDEN, json!({ "error": "Not authorised" }))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            AppError::Validation(msgs) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": msgs.join(". "), "messages": msgs }),
            ),
            AppError::ImportFormat(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": format!("CSV upload error. {msg}") }),
            ),
            AppError::Conversion(e) => {
                tracing::error!("Document conversion failed: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    json!({ "error": "Document conversion failed" }),
                )
            }
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({ "error": "Too many requests" }),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
            AppError::Jwt(_) => (StatusCode::UNAUTHORIZED, json!({ "error": "Invalid token" })),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
