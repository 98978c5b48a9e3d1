use axum::{extract::FromRequestParts, http::request::Parts};

use crate::auth::jwt::IdentityVerifier;
use crate::error::{ApiError, AuthError};

/// Authenticated caller extracted from `Authorization: Bearer <token>`.
/// Implements axum's FromRequestParts for use as an extractor.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: i64,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::Missing)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::Missing)?;

        // Set by the inject_verifier middleware layer
        let verifier = parts
            .extensions
            .get::<IdentityVerifier>()
            .ok_or_else(|| ApiError::Upstream("identity verifier missing from extensions".into()))?;

        let identity = verifier.verify(token)?;
        Ok(AuthUser {
            user_id: identity.user_id,
        })
    }
}
