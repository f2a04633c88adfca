use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::ports::RepositoryError;
use crate::stellar::client::RpcError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(ValidationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Confirmation token not found")]
    TokenNotFound,

    #[error("Confirmation token already used")]
    TokenAlreadyUsed,

    #[error("Confirmation token expired")]
    TokenExpired,

    #[error("Confirmation token action or resource mismatch")]
    TokenScopeMismatch,

    #[error("Confirmation token belongs to a different admin")]
    TokenAdminMismatch,

    #[error("Prepared transaction fee {fee} exceeds max fee {max}")]
    FeeLimitExceeded { fee: i64, max: i64 },

    #[error("Network error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::TokenNotFound => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::TokenAlreadyUsed => StatusCode::CONFLICT,
            AppError::TokenExpired => StatusCode::GONE,
            AppError::TokenScopeMismatch | AppError::TokenAdminMismatch => StatusCode::FORBIDDEN,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::FeeLimitExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Rpc(_) => StatusCode::BAD_GATEWAY,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(message) => AppError::NotFound(message),
            RepositoryError::DuplicateIdempotencyKey(message) => AppError::Conflict(message),
            RepositoryError::Storage(message) => AppError::Storage(message),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal detail stays in the server-side logs; the caller gets a
        // generic message.
        let body = match &self {
            AppError::Validation(err) => Json(json!({
                "error": err.message,
                "field": err.field,
                "status": status.as_u16(),
            })),
            AppError::Storage(message) | AppError::Internal(message) => {
                tracing::error!(error = %message, "internal error");
                Json(json!({
                    "error": "Internal server error",
                    "status": status.as_u16(),
                }))
            }
            other => Json(json!({
                "error": other.to_string(),
                "status": status.as_u16(),
            })),
        };

        (status, body).into_response()
    }
}
