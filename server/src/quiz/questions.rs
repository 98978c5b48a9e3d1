use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::stats::{load_question_stats, QuestionStats};
use crate::auth::middleware::AuthUser;
use crate::db::models::{Question, QuestionType};
use crate::db::{self, store};
use crate::error::ApiError;
use crate::presentations::{can_manage, load_presentation};
use crate::roles::permissions::{current_user, require_capability, Capabilities, Role};
use crate::state::AppState;
use crate::ws::events::{QuestionPayload, ServerEvent};

// --- Request types ---

#[derive(Debug, Deserialize)]
pub struct CreateQuestionRequest {
    pub question_text: Option<String>,
    pub question_type: Option<String>,
    pub options: Option<Vec<String>>,
    pub correct_answer: Option<String>,
}

// --- Response types ---

#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: i64,
    pub question_text: String,
    pub question_type: QuestionType,
    pub options: Option<Vec<String>>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
}

impl QuestionView {
    fn new(q: Question, reveal_answer: bool) -> Self {
        Self {
            id: q.id,
            question_text: q.question_text,
            question_type: q.question_type,
            options: q.options,
            is_active: q.is_active,
            correct_answer: if reveal_answer { q.correct_answer } else { None },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeactivateResponse {
    pub msg: String,
    pub stats: QuestionStats,
}

/// Validated create-question input.
#[derive(Debug, PartialEq)]
struct NewQuestion {
    text: String,
    question_type: QuestionType,
    options: Option<Vec<String>>,
    correct_answer: Option<String>,
}

fn validate_new_question(req: CreateQuestionRequest) -> Result<NewQuestion, ApiError> {
    let text = req
        .question_text
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::validation("Question text is required"))?;
    let question_type = match req.question_type.as_deref() {
        None => QuestionType::default(),
        Some(name) => QuestionType::parse(name)
            .ok_or_else(|| ApiError::validation(format!("Unknown question type '{}'", name)))?,
    };
    let options = req.options.filter(|o| !o.is_empty());
    if question_type == QuestionType::MultipleChoice && options.is_none() {
        return Err(ApiError::validation(
            "Options are required for multiple choice questions",
        ));
    }
    Ok(NewQuestion {
        text,
        question_type,
        options,
        // An empty correct answer means "not graded"
        correct_answer: req.correct_answer.filter(|a| !a.is_empty()),
    })
}

/// Check read access to a presentation's questions.
/// Returns whether the caller may see correct answers.
async fn authorize_question_read(state: &AppState, user_id: i64, presentation_id: i64) -> Result<bool, ApiError> {
    let presentation = load_presentation(&state.db, presentation_id).await?;
    let user = current_user(&state.db, user_id).await?;
    if can_manage(&user, &presentation, Capabilities::VIEW_STATS) {
        return Ok(true);
    }
    match user.role {
        Role::Organizer | Role::Speaker => Err(ApiError::forbidden("You are not the speaker for this presentation")),
        Role::Listener => {
            let registered =
                db::run(&state.db, move |conn| store::is_listener_of(conn, presentation_id, user_id)).await?;
            if registered {
                Ok(false)
            } else {
                Err(ApiError::forbidden("You are not a listener for this presentation"))
            }
        }
    }
}

// --- Handlers ---

/// POST /api/quiz/presentations/{id}/questions
///
/// Owner speaker only. The new question is active and is broadcast to the room
/// as `new_question`.
pub async fn create_question(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(presentation_id): Path<i64>,
    Json(req): Json<CreateQuestionRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let speaker = require_capability(&state.db, auth.user_id, Capabilities::MANAGE_QUESTIONS).await?;
    let presentation = load_presentation(&state.db, presentation_id).await?;
    if presentation.speaker_id != speaker.id {
        return Err(ApiError::forbidden("You are not the speaker for this presentation"));
    }
    let new = validate_new_question(req)?;

    let question = db::run(&state.db, move |conn| {
        store::insert_question(
            conn,
            presentation_id,
            &new.text,
            new.question_type,
            new.options.as_deref(),
            new.correct_answer.as_deref(),
        )
    })
    .await?;

    tracing::info!(presentation_id, question_id = question.id, "Question created");
    state
        .sessions
        .emit_to_room(presentation_id, ServerEvent::NewQuestion(QuestionPayload::from(&question)));

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "msg": "Question created successfully",
            "question_id": question.id,
        })),
    ))
}

/// GET /api/quiz/presentations/{id}/questions
pub async fn list_questions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(presentation_id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let reveal = authorize_question_read(&state, auth.user_id, presentation_id).await?;
    let questions = db::run(&state.db, move |conn| store::list_questions(conn, presentation_id, false)).await?;
    let questions: Vec<QuestionView> = questions.into_iter().map(|q| QuestionView::new(q, reveal)).collect();
    Ok(Json(serde_json::json!({ "questions": questions })))
}

/// GET /api/quiz/presentations/{id}/active_questions
pub async fn list_active_questions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(presentation_id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let reveal = authorize_question_read(&state, auth.user_id, presentation_id).await?;
    let questions = db::run(&state.db, move |conn| store::list_questions(conn, presentation_id, true)).await?;
    let questions: Vec<QuestionView> = questions.into_iter().map(|q| QuestionView::new(q, reveal)).collect();
    Ok(Json(serde_json::json!({ "active_questions": questions })))
}

/// GET /api/quiz/presentations/{id}/active_question
///
/// The most recently created question that is still open.
pub async fn current_active_question(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(presentation_id): Path<i64>,
) -> Result<Json<QuestionView>, ApiError> {
    let reveal = authorize_question_read(&state, auth.user_id, presentation_id).await?;
    let newest = db::run(&state.db, move |conn| store::list_questions(conn, presentation_id, true))
        .await?
        .pop()
        .ok_or_else(|| ApiError::not_found("No active question for this presentation"))?;
    Ok(Json(QuestionView::new(newest, reveal)))
}

/// POST /api/quiz/questions/{id}/deactivate
///
/// Owner speaker only. Broadcasts `question_deactivated` followed by the final
/// `question_stats_update`, and returns the same stats.
pub async fn deactivate_question(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(question_id): Path<i64>,
) -> Result<Json<DeactivateResponse>, ApiError> {
    let speaker = require_capability(&state.db, auth.user_id, Capabilities::MANAGE_QUESTIONS).await?;
    let question = db::run(&state.db, move |conn| store::get_question(conn, question_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Question not found"))?;
    let presentation = load_presentation(&state.db, question.presentation_id).await?;
    if presentation.speaker_id != speaker.id {
        return Err(ApiError::forbidden("Unauthorized to deactivate this question"));
    }

    db::run(&state.db, move |conn| store::deactivate_question(conn, question_id)).await?;
    let presentation_id = question.presentation_id;
    let stats = load_question_stats(&state.db, Question { is_active: false, ..question }).await?;

    tracing::info!(presentation_id, question_id, total_answers = stats.total_answers, "Question deactivated");
    state.sessions.emit_to_room(
        presentation_id,
        ServerEvent::QuestionDeactivated {
            question_id,
            presentation_id,
        },
    );
    state
        .sessions
        .emit_to_room(presentation_id, ServerEvent::QuestionStatsUpdate(stats.clone()));

    Ok(Json(DeactivateResponse {
        msg: "Question deactivated successfully".to_string(),
        stats,
    }))
}
