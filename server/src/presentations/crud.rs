use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::{can_manage, load_presentation};
use crate::auth::middleware::AuthUser;
use crate::db::{self, store};
use crate::error::ApiError;
use crate::roles::permissions::{current_user, require_capability, Capabilities};
use crate::state::AppState;

// --- Request types ---

#[derive(Debug, Deserialize)]
pub struct CreatePresentationRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePresentationRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

// --- Response types ---

#[derive(Debug, Serialize)]
pub struct PresentationSummary {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub speaker: String,
}

#[derive(Debug, Serialize)]
pub struct ListenerEntry {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct LiveRoom {
    pub speaker_connected: bool,
    pub listeners_count: usize,
}

#[derive(Debug, Serialize)]
pub struct PresentationDetail {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub speaker: String,
    pub listeners: Vec<ListenerEntry>,
    pub live: LiveRoom,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// --- Handlers ---

/// POST /api/presentations: a speaker creates a presentation they own.
pub async fn create_presentation(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreatePresentationRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let speaker = require_capability(&state.db, auth.user_id, Capabilities::CREATE_PRESENTATIONS).await?;
    let title = non_empty(req.title).ok_or_else(|| ApiError::validation("Title is required"))?;
    let description = req.description;

    let presentation_id = db::run(&state.db, move |conn| {
        store::insert_presentation(conn, &title, description.as_deref(), speaker.id)
    })
    .await?;

    tracing::info!(presentation_id, speaker_id = auth.user_id, "Presentation created");

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "msg": "Presentation created successfully",
            "presentation_id": presentation_id,
        })),
    ))
}

/// GET /api/presentations
pub async fn list_presentations(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<PresentationSummary>>, ApiError> {
    let rows = db::run(&state.db, |conn| store::list_presentations(conn)).await?;
    Ok(Json(
        rows.into_iter()
            .map(|(p, speaker)| PresentationSummary {
                id: p.id,
                title: p.title,
                description: p.description,
                speaker,
            })
            .collect(),
    ))
}

/// GET /api/presentations/{id}: details, registered listeners and live room status.
pub async fn get_presentation(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(presentation_id): Path<i64>,
) -> Result<Json<PresentationDetail>, ApiError> {
    let presentation = load_presentation(&state.db, presentation_id).await?;
    let speaker_id = presentation.speaker_id;
    let (speaker, listeners) = db::run(&state.db, move |conn| {
        let speaker = store::get_user(conn, speaker_id)?
            .map(|u| u.username)
            .unwrap_or_default();
        Ok((speaker, store::listeners_of(conn, presentation_id)?))
    })
    .await?;
    let live = state.sessions.snapshot(presentation_id).await?;

    Ok(Json(PresentationDetail {
        id: presentation.id,
        title: presentation.title,
        description: presentation.description,
        speaker,
        listeners: listeners
            .into_iter()
            .map(|(id, username)| ListenerEntry { id, username })
            .collect(),
        live: LiveRoom {
            speaker_connected: live.speaker_connected,
            listeners_count: live.listeners_count,
        },
    }))
}

/// PUT /api/presentations/{id}: owner speaker or organizer. Blank fields are left unchanged.
pub async fn update_presentation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(presentation_id): Path<i64>,
    Json(req): Json<UpdatePresentationRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let presentation = load_presentation(&state.db, presentation_id).await?;
    let user = current_user(&state.db, auth.user_id).await?;
    if !can_manage(&user, &presentation, Capabilities::EDIT_PRESENTATIONS) {
        return Err(ApiError::forbidden("Unauthorized to update this presentation"));
    }

    let title = non_empty(req.title);
    let description = non_empty(req.description);
    db::run(&state.db, move |conn| {
        store::update_presentation(conn, presentation_id, title.as_deref(), description.as_deref())
    })
    .await?;

    Ok(Json(serde_json::json!({ "msg": "Presentation updated successfully" })))
}

/// DELETE /api/presentations/{id}: owner speaker or organizer. Cascades to questions,
/// answers, feedback and attendee rows.
pub async fn delete_presentation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(presentation_id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let presentation = load_presentation(&state.db, presentation_id).await?;
    let user = current_user(&state.db, auth.user_id).await?;
    if !can_manage(&user, &presentation, Capabilities::EDIT_PRESENTATIONS) {
        return Err(ApiError::forbidden("Unauthorized to delete this presentation"));
    }

    db::run(&state.db, move |conn| store::delete_presentation(conn, presentation_id)).await?;
    tracing::info!(presentation_id, user_id = auth.user_id, "Presentation deleted");

    Ok(Json(serde_json::json!({ "msg": "Presentation deleted successfully" })))
}
