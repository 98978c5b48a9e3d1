use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use super::{can_manage, load_presentation};
use crate::auth::middleware::AuthUser;
use crate::db::{self, store};
use crate::error::ApiError;
use crate::roles::permissions::{current_user, Capabilities, Role};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListenerRequest {
    pub listener_id: Option<i64>,
}

/// An empty body is allowed (a listener adding themself sends none).
fn parse_listener_request(body: &Bytes) -> Result<ListenerRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ListenerRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::validation(format!("Invalid request body: {}", e)))
}

/// Resolve `listener_id` to a stored listener account.
async fn load_listener(state: &AppState, listener_id: Option<i64>) -> Result<i64, ApiError> {
    let listener_id = listener_id.ok_or_else(|| ApiError::validation("Listener ID is required"))?;
    let listener = db::run(&state.db, move |conn| store::get_user(conn, listener_id)).await?;
    match listener {
        Some(user) if user.role == Role::Listener => Ok(user.id),
        _ => Err(ApiError::not_found("Listener not found or not a listener role")),
    }
}

/// POST /api/presentations/{id}/add_listener
///
/// Listeners register themselves. The owner speaker or an organizer registers
/// the listener named by `listener_id`.
pub async fn add_listener(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(presentation_id): Path<i64>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let presentation = load_presentation(&state.db, presentation_id).await?;
    let user = current_user(&state.db, auth.user_id).await?;

    let listener_id = if user.role == Role::Listener {
        user.id
    } else {
        let req = parse_listener_request(&body)?;
        let listener_id = load_listener(&state, req.listener_id).await?;
        if !can_manage(&user, &presentation, Capabilities::MANAGE_LISTENERS) {
            return Err(ApiError::forbidden("Unauthorized to add listener to this presentation"));
        }
        listener_id
    };

    let added = db::run(&state.db, move |conn| store::add_listener(conn, presentation_id, listener_id)).await?;
    if !added {
        return Err(ApiError::conflict("Listener already associated with this presentation"));
    }

    tracing::info!(presentation_id, listener_id, by = auth.user_id, "Listener registered");
    Ok(Json(serde_json::json!({ "msg": "Listener added to presentation successfully" })))
}

/// POST /api/presentations/{id}/remove_listener: owner speaker or organizer.
pub async fn remove_listener(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(presentation_id): Path<i64>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let req = parse_listener_request(&body)?;
    let presentation = load_presentation(&state.db, presentation_id).await?;
    let listener_id = load_listener(&state, req.listener_id).await?;
    let user = current_user(&state.db, auth.user_id).await?;
    if !can_manage(&user, &presentation, Capabilities::MANAGE_LISTENERS) {
        return Err(ApiError::forbidden("Unauthorized to remove listener from this presentation"));
    }

    let removed = db::run(&state.db, move |conn| store::remove_listener(conn, presentation_id, listener_id)).await?;
    if !removed {
        return Err(ApiError::conflict("Listener not associated with this presentation"));
    }

    tracing::info!(presentation_id, listener_id, by = auth.user_id, "Listener unregistered");
    Ok(Json(serde_json::json!({ "msg": "Listener removed from presentation successfully" })))
}
