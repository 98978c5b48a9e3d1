//! Answer aggregation for questions, listeners and whole presentations.
//!
//! Rates are rendered as `"{:.2}%"`; an empty denominator yields `"0.00%"`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::db::models::{Answer, Presentation, Question, QuestionType, User};
use crate::db::{self, store, DbPool};
use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionStats {
    pub question_id: i64,
    pub question_text: String,
    pub total_answers: usize,
    pub correct_answers: usize,
    pub correct_rate: String,
    /// Answer text to count. Only populated for multiple-choice questions.
    pub option_distribution: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionDetail {
    pub question_id: i64,
    pub question_text: String,
    pub your_answer: Option<String>,
    pub is_correct: Option<bool>,
    pub correct_answer: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListenerReport {
    pub listener_id: i64,
    pub listener_username: String,
    pub presentation_id: i64,
    pub presentation_title: String,
    pub total_questions_in_presentation: usize,
    pub answered_questions: usize,
    pub correct_answers: usize,
    pub accuracy_rate: String,
    pub question_details: Vec<QuestionDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListenerPerformance {
    pub listener_id: i64,
    pub listener_username: String,
    pub answered_questions: usize,
    pub correct_answers: usize,
    pub accuracy_rate: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverallStats {
    pub presentation_id: i64,
    pub presentation_title: String,
    pub total_participants: usize,
    pub total_questions_in_presentation: usize,
    pub total_answers_submitted: usize,
    pub average_correct_rate_across_all_questions: String,
    pub listener_performance: Vec<ListenerPerformance>,
}

pub fn format_rate(numerator: usize, denominator: usize) -> String {
    if denominator == 0 {
        return "0.00%".to_string();
    }
    format!("{:.2}%", numerator as f64 / denominator as f64 * 100.0)
}

pub fn compute_question_stats(question: &Question, answers: &[Answer]) -> QuestionStats {
    let total_answers = answers.len();
    let correct_answers = answers.iter().filter(|a| a.is_correct == Some(true)).count();

    let mut option_distribution = BTreeMap::new();
    if question.question_type == QuestionType::MultipleChoice && question.options.is_some() {
        for answer in answers {
            *option_distribution.entry(answer.answer_text.clone()).or_insert(0) += 1;
        }
    }

    QuestionStats {
        question_id: question.id,
        question_text: question.question_text.clone(),
        total_answers,
        correct_answers,
        correct_rate: format_rate(correct_answers, total_answers),
        option_distribution,
    }
}

/// `answered` pairs each question of the presentation with the listener's answer, if any.
pub fn compute_listener_report(
    listener: &User,
    presentation: &Presentation,
    answered: &[(Question, Option<Answer>)],
) -> ListenerReport {
    let answered_questions = answered.iter().filter(|(_, a)| a.is_some()).count();
    let correct_answers = answered
        .iter()
        .filter(|(_, a)| a.as_ref().and_then(|a| a.is_correct) == Some(true))
        .count();

    ListenerReport {
        listener_id: listener.id,
        listener_username: listener.username.clone(),
        presentation_id: presentation.id,
        presentation_title: presentation.title.clone(),
        total_questions_in_presentation: answered.len(),
        answered_questions,
        correct_answers,
        accuracy_rate: format_rate(correct_answers, answered_questions),
        question_details: answered
            .iter()
            .map(|(q, a)| QuestionDetail {
                question_id: q.id,
                question_text: q.question_text.clone(),
                your_answer: a.as_ref().map(|a| a.answer_text.clone()),
                is_correct: a.as_ref().and_then(|a| a.is_correct),
                correct_answer: q.correct_answer.clone(),
            })
            .collect(),
    }
}

/// Recompute a question's stats from storage.
pub async fn load_question_stats(db: &DbPool, question: Question) -> Result<QuestionStats, ApiError> {
    let question_id = question.id;
    let answers = db::run(db, move |conn| store::answers_for_question(conn, question_id)).await?;
    Ok(compute_question_stats(&question, &answers))
}

/// Questions of a presentation paired with one user's answers.
pub fn answered_by(
    conn: &rusqlite::Connection,
    presentation_id: i64,
    user_id: i64,
) -> Result<Vec<(Question, Option<Answer>)>, ApiError> {
    store::list_questions(conn, presentation_id, false)?
        .into_iter()
        .map(|q| {
            let answer = store::answer_for_user(conn, q.id, user_id)?;
            Ok((q, answer))
        })
        .collect()
}
