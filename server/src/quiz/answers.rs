use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::stats::load_question_stats;
use crate::auth::middleware::AuthUser;
use crate::db::{self, store};
use crate::error::ApiError;
use crate::roles::permissions::{require_capability, Capabilities};
use crate::state::AppState;
use crate::ws::events::ServerEvent;

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub answer_text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitAnswerResponse {
    pub msg: String,
    pub answer_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

/// Exact string comparison against the stored correct answer. Ungraded questions yield None.
pub fn grade(correct_answer: Option<&str>, answer_text: &str) -> Option<bool> {
    correct_answer
        .filter(|c| !c.is_empty())
        .map(|c| c == answer_text)
}

/// POST /api/quiz/questions/{id}/answer
///
/// Listener only, first submission wins. After the answer is stored the
/// question's stats are recomputed and broadcast as `question_stats_update`.
pub async fn submit_answer(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(question_id): Path<i64>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<(StatusCode, Json<SubmitAnswerResponse>), ApiError> {
    let listener = require_capability(&state.db, auth.user_id, Capabilities::ANSWER_QUESTIONS).await?;
    let answer_text = req
        .answer_text
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ApiError::validation("Answer text is required"))?;

    let question = db::run(&state.db, move |conn| store::get_question(conn, question_id))
        .await?
        .filter(|q| q.is_active)
        .ok_or_else(|| ApiError::not_found("Question not found or not active"))?;

    let is_correct = grade(question.correct_answer.as_deref(), &answer_text);
    let user_id = listener.id;
    let answer_id = db::run(&state.db, move |conn| {
        store::record_answer(conn, question_id, user_id, &answer_text, is_correct)
    })
    .await?;

    tracing::info!(question_id, user_id, answer_id, ?is_correct, "Answer recorded");

    // The answer is committed; a stats failure must not turn it into an error response.
    let presentation_id = question.presentation_id;
    match load_question_stats(&state.db, question).await {
        Ok(stats) => state
            .sessions
            .emit_to_room(presentation_id, ServerEvent::QuestionStatsUpdate(stats)),
        Err(e) => tracing::warn!(question_id, error = %e, "Skipping stats broadcast"),
    }

    Ok((
        StatusCode::CREATED,
        Json(SubmitAnswerResponse {
            msg: "Answer submitted successfully".to_string(),
            answer_id,
            is_correct,
        }),
    ))
}
