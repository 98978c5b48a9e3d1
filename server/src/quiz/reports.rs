use axum::{
    extract::{Path, State},
    Json,
};

use super::stats::{
    answered_by, compute_listener_report, format_rate, load_question_stats, ListenerPerformance, ListenerReport,
    OverallStats, QuestionStats,
};
use crate::auth::middleware::AuthUser;
use crate::db::{self, store};
use crate::error::ApiError;
use crate::presentations::{can_manage, load_presentation};
use crate::roles::permissions::{current_user, Capabilities, Role};
use crate::state::AppState;

/// GET /api/quiz/questions/{id}/stats: organizer or owner speaker.
pub async fn question_stats(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(question_id): Path<i64>,
) -> Result<Json<QuestionStats>, ApiError> {
    let question = db::run(&state.db, move |conn| store::get_question(conn, question_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Question not found"))?;
    let presentation = load_presentation(&state.db, question.presentation_id).await?;
    let user = current_user(&state.db, auth.user_id).await?;
    if !can_manage(&user, &presentation, Capabilities::VIEW_STATS) {
        return Err(ApiError::forbidden("Unauthorized to view question statistics"));
    }

    Ok(Json(load_question_stats(&state.db, question).await?))
}

/// GET /api/quiz/presentations/{id}/report/{user_id}
///
/// Listeners may read their own report; the owner speaker and organizers may read any.
pub async fn listener_report(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((presentation_id, listener_id)): Path<(i64, i64)>,
) -> Result<Json<ListenerReport>, ApiError> {
    let presentation = load_presentation(&state.db, presentation_id).await?;
    let requester = current_user(&state.db, auth.user_id).await?;
    let authorized = match requester.role {
        Role::Listener => requester.id == listener_id,
        _ => can_manage(&requester, &presentation, Capabilities::VIEW_STATS),
    };
    if !authorized {
        return Err(ApiError::forbidden("Unauthorized to view this report"));
    }

    let (listener, answered) = db::run(&state.db, move |conn| {
        let listener = store::get_user(conn, listener_id)?
            .filter(|u| u.role == Role::Listener)
            .ok_or_else(|| ApiError::not_found("User is not a listener"))?;
        Ok((listener, answered_by(conn, presentation_id, listener_id)?))
    })
    .await?;

    Ok(Json(compute_listener_report(&listener, &presentation, &answered)))
}

/// GET /api/quiz/presentations/{id}/overall_stats: organizer or owner speaker.
pub async fn overall_stats(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(presentation_id): Path<i64>,
) -> Result<Json<OverallStats>, ApiError> {
    let presentation = load_presentation(&state.db, presentation_id).await?;
    let user = current_user(&state.db, auth.user_id).await?;
    if !can_manage(&user, &presentation, Capabilities::VIEW_STATS) {
        return Err(ApiError::forbidden("Unauthorized to view presentation statistics"));
    }

    let (question_count, total_answers, total_correct, listener_rows) = db::run(&state.db, move |conn| {
        let questions = store::list_questions(conn, presentation_id, false)?;
        let mut total_answers = 0;
        let mut total_correct = 0;
        for q in &questions {
            let answers = store::answers_for_question(conn, q.id)?;
            total_answers += answers.len();
            total_correct += answers.iter().filter(|a| a.is_correct == Some(true)).count();
        }

        let mut listener_rows = Vec::new();
        for (listener_id, _) in store::listeners_of(conn, presentation_id)? {
            if let Some(listener) = store::get_user(conn, listener_id)? {
                listener_rows.push((listener, answered_by(conn, presentation_id, listener_id)?));
            }
        }
        Ok((questions.len(), total_answers, total_correct, listener_rows))
    })
    .await?;

    let listener_performance = listener_rows
        .iter()
        .map(|(listener, answered)| {
            let report = compute_listener_report(listener, &presentation, answered);
            ListenerPerformance {
                listener_id: report.listener_id,
                listener_username: report.listener_username,
                answered_questions: report.answered_questions,
                correct_answers: report.correct_answers,
                accuracy_rate: report.accuracy_rate,
            }
        })
        .collect::<Vec<_>>();

    Ok(Json(OverallStats {
        presentation_id: presentation.id,
        presentation_title: presentation.title.clone(),
        total_participants: listener_performance.len(),
        total_questions_in_presentation: question_count,
        total_answers_submitted: total_answers,
        average_correct_rate_across_all_questions: format_rate(total_correct, total_answers),
        listener_performance,
    }))
}
