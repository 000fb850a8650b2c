//! The HTTP-facing error type.
//!
//! Every error kind collapses to this one enum so that a
//! single `IntoResponse` impl owns the status-code mapping. Provider
//! (upstream) errors are the one exception: they already carry their own
//! OpenAI-shaped error envelope built by [`crate::providers::response`] and
//! are returned directly from handlers rather than funneled through here.

use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde::Serialize;

use crate::db::DbError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ApiError::AlreadyExists(m) => (StatusCode::CONFLICT, m.clone()),
            ApiError::Validation(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::Authentication(m) => (StatusCode::UNAUTHORIZED, m.clone()),
            ApiError::Authorization(m) => (StatusCode::FORBIDDEN, m.clone()),
            ApiError::Configuration(m) => {
                tracing::error!(error = %m, "configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
            ApiError::Internal(m) => {
                tracing::error!(error = %m, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
        };

        (status, Json(ErrorBody { detail: message })).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => ApiError::NotFound("entity not found".to_string()),
            DbError::Conflict(m) => ApiError::AlreadyExists(m),
            DbError::Validation(m) => ApiError::Validation(m),
            DbError::NotConfigured => {
                ApiError::Configuration("no database configured".to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
