//! Error taxonomy shared by the HTTP API and the WebSocket protocol.
//!
//! Every failure at the connection boundary is converted either into an HTTP
//! response (`IntoResponse`) or into an `error` event via [`ApiError::public_message`].
//! Upstream failures are logged with detail and reported generically.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Credential verification failures.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing credential")]
    Missing,
    #[error("credential expired")]
    Expired,
    #[error("invalid credential")]
    Invalid,
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::Invalid,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("{0}")]
    NotFound(String),
    /// Role or ownership mismatch.
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Validation(String),
    /// Storage (or any other collaborator) failed. The detail is never shown to clients.
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("{0}")]
    UnsupportedMedia(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ApiError::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ApiError::Conflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        }
    }

    /// User-safe message for responses and `error` events.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Auth(_) => "Authentication failed".to_string(),
            ApiError::Upstream(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Upstream(format!("database: {}", err))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Upstream(format!("task join: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Upstream(detail) => tracing::error!(error = %detail, "Upstream failure"),
            ApiError::Auth(err) => tracing::debug!(error = %err, "Request rejected: auth"),
            _ => {}
        }
        (status, Json(serde_json::json!({ "msg": self.public_message() }))).into_response()
    }
}
