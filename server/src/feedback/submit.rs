use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::middleware::AuthUser;
use crate::db::{self, store};
use crate::error::ApiError;
use crate::presentations::load_presentation;
use crate::roles::permissions::{require_capability, Capabilities};
use crate::state::AppState;
use crate::ws::events::{FeedbackPayload, ServerEvent};

#[derive(Debug, Deserialize)]
pub struct SubmitFeedbackRequest {
    pub feedback_type: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitFeedbackResponse {
    pub msg: String,
    pub feedback_id: i64,
    pub delivered: bool,
}

/// Outcome of a feedback submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub feedback_id: i64,
    /// False when no speaker was connected; the record is stored either way.
    pub delivered: bool,
}

/// Persist a feedback record, then hand it to the room's speaker connection.
///
/// Shared by the `feedback` WebSocket event and the HTTP endpoint. The sender
/// must be a listener registered for the presentation.
pub async fn record_and_deliver(
    state: &AppState,
    user_id: i64,
    presentation_id: i64,
    feedback_type: String,
    content: Option<String>,
) -> Result<Delivery, ApiError> {
    let feedback_type = feedback_type.trim().to_string();
    if feedback_type.is_empty() {
        return Err(ApiError::validation("Feedback type is required"));
    }
    let listener = require_capability(&state.db, user_id, Capabilities::SEND_FEEDBACK).await?;
    load_presentation(&state.db, presentation_id).await?;

    let feedback = db::run(&state.db, move |conn| {
        if !store::is_listener_of(conn, presentation_id, user_id)? {
            return Err(ApiError::forbidden("You are not a listener for this presentation"));
        }
        store::record_feedback(conn, presentation_id, user_id, &feedback_type, content.as_deref())
    })
    .await?;

    let event = ServerEvent::ReceiveFeedback(FeedbackPayload::new(&feedback, &listener.username));
    let delivered = match state.sessions.deliver_to_speaker(presentation_id, event).await {
        Ok(delivered) => delivered,
        Err(e) => {
            tracing::warn!(presentation_id, error = %e, "Feedback stored but not delivered");
            false
        }
    };

    tracing::info!(
        presentation_id,
        user_id,
        feedback_id = feedback.id,
        feedback_type = %feedback.feedback_type,
        delivered,
        "Feedback recorded"
    );

    Ok(Delivery {
        feedback_id: feedback.id,
        delivered,
    })
}

/// POST /api/feedback/presentations/{id}/submit
pub async fn submit_feedback(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(presentation_id): Path<i64>,
    Json(req): Json<SubmitFeedbackRequest>,
) -> Result<(StatusCode, Json<SubmitFeedbackResponse>), ApiError> {
    let delivery = record_and_deliver(
        &state,
        auth.user_id,
        presentation_id,
        req.feedback_type.unwrap_or_default(),
        req.content,
    )
    .await?;

    let msg = if delivery.delivered {
        "Feedback submitted successfully"
    } else {
        "Feedback recorded, speaker is offline"
    };
    Ok((
        StatusCode::CREATED,
        Json(SubmitFeedbackResponse {
            msg: msg.to_string(),
            feedback_id: delivery.feedback_id,
            delivered: delivery.delivered,
        }),
    ))
}
