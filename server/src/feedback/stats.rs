use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::auth::middleware::AuthUser;
use crate::db::models::Feedback;
use crate::db::{self, store};
use crate::error::ApiError;
use crate::presentations::{can_manage, load_presentation};
use crate::roles::permissions::{current_user, Capabilities};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct FeedbackStats {
    pub presentation_id: i64,
    pub presentation_title: String,
    pub total_feedbacks: usize,
    pub feedback_counts: BTreeMap<String, usize>,
}

pub fn count_by_type(feedback: &[Feedback]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for fb in feedback {
        *counts.entry(fb.feedback_type.clone()).or_insert(0) += 1;
    }
    counts
}

/// GET /api/feedback/presentations/{id}/stats: organizer or owner speaker.
pub async fn feedback_stats(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(presentation_id): Path<i64>,
) -> Result<Json<FeedbackStats>, ApiError> {
    let presentation = load_presentation(&state.db, presentation_id).await?;
    let user = current_user(&state.db, auth.user_id).await?;
    if !can_manage(&user, &presentation, Capabilities::VIEW_STATS) {
        return Err(ApiError::forbidden("Unauthorized to view feedback statistics"));
    }

    let feedback = db::run(&state.db, move |conn| store::feedback_for_presentation(conn, presentation_id)).await?;

    Ok(Json(FeedbackStats {
        presentation_id: presentation.id,
        presentation_title: presentation.title,
        total_feedbacks: feedback.len(),
        feedback_counts: count_by_type(&feedback),
    }))
}
