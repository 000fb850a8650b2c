//! Authentication failure modes.

use axum::response::{IntoResponse, Response};

use crate::error::ApiError;

/// Failure modes for the auth resolver. All variants collapse to a
/// generic 401 at the HTTP boundary — the distinction exists for logging,
/// not for the client-visible response (enumeration of credential state is
/// itself an information leak).
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing credentials")]
    MissingCredentials,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("token expired")]
    ExpiredToken,

    #[error("invalid token")]
    InvalidToken,

    #[error("auth resolver error: {0}")]
    Internal(String),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Authentication(err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
