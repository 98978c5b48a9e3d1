use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::auth::middleware::AuthUser;
use crate::auth::password::{hash_password, verify_password};
use crate::db::{self, store};
use crate::error::{ApiError, AuthError};
use crate::roles::permissions::Role;
use crate::state::AppState;

// --- Request types ---

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

// --- Response types ---

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub msg: String,
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user_id: i64,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

fn required(field: Option<String>) -> Option<String> {
    field.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

// --- Handlers ---

/// POST /api/auth/register: create an account. Role defaults to listener.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let (Some(username), Some(password)) = (required(req.username), req.password.filter(|p| !p.is_empty()))
    else {
        return Err(ApiError::validation("Username and password are required"));
    };
    let role = match req.role.as_deref() {
        None => Role::Listener,
        Some(name) => Role::parse(name).ok_or_else(|| ApiError::validation(format!("Unknown role '{}'", name)))?,
    };

    // Argon2 is CPU-bound; hash on the blocking pool without holding the DB lock
    let hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;
    let user_id = db::run(&state.db, move |conn| store::insert_user(conn, &username, &hash, role)).await?;

    tracing::info!(user_id, role = %role, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            msg: "User registered successfully".to_string(),
            user_id,
        }),
    ))
}

/// POST /api/auth/login: exchange username and password for an access token.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let (Some(username), Some(password)) = (required(req.username), req.password) else {
        return Err(ApiError::validation("Username and password are required"));
    };

    let user = db::run(&state.db, move |conn| store::find_user_by_username(conn, &username)).await?;
    let user = tokio::task::spawn_blocking(move || {
        user.filter(|u| verify_password(&password, &u.password_hash))
    })
    .await?
    .ok_or_else(|| {
        tracing::debug!("Login rejected: bad username or password");
        ApiError::Auth(AuthError::Invalid)
    })?;

    let access_token = state.verifier.issue(user.id, user.role)?;
    tracing::info!(user_id = user.id, "User logged in");

    Ok(Json(LoginResponse {
        access_token,
        user_id: user.id,
        role: user.role,
    }))
}

/// GET /api/auth/profile: the caller's account.
pub async fn profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = db::run(&state.db, move |conn| store::get_user(conn, auth.user_id))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(ProfileResponse {
        id: user.id,
        username: user.username,
        role: user.role,
    }))
}
