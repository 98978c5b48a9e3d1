//! Repository functions over the SQLite connection.
//!
//! Every function takes a borrowed connection and is meant to run inside
//! [`crate::db::run`]. Nothing here caches rows beyond a single call.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use super::models::{Answer, Feedback, Presentation, Question, QuestionType, User};
use crate::error::ApiError;
use crate::roles::permissions::Role;

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// --- Users ---

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        role: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn insert_user(
    conn: &Connection,
    username: &str,
    password_hash: &str,
    role: Role,
) -> Result<i64, ApiError> {
    let now = Utc::now().to_rfc3339();
    match conn.execute(
        "INSERT INTO users (username, password_hash, role, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![username, password_hash, role, now],
    ) {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if is_constraint_violation(&e) => Err(ApiError::conflict("Username already exists")),
        Err(e) => Err(e.into()),
    }
}

pub fn get_user(conn: &Connection, user_id: i64) -> Result<Option<User>, ApiError> {
    Ok(conn
        .query_row(
            "SELECT id, username, password_hash, role, created_at FROM users WHERE id = ?1",
            [user_id],
            user_from_row,
        )
        .optional()?)
}

pub fn find_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>, ApiError> {
    Ok(conn
        .query_row(
            "SELECT id, username, password_hash, role, created_at FROM users WHERE username = ?1",
            [username],
            user_from_row,
        )
        .optional()?)
}

// --- Presentations ---

fn presentation_from_row(row: &Row<'_>) -> rusqlite::Result<Presentation> {
    Ok(Presentation {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        speaker_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn insert_presentation(
    conn: &Connection,
    title: &str,
    description: Option<&str>,
    speaker_id: i64,
) -> Result<i64, ApiError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO presentations (title, description, speaker_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![title, description, speaker_id, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_presentation(conn: &Connection, id: i64) -> Result<Option<Presentation>, ApiError> {
    Ok(conn
        .query_row(
            "SELECT id, title, description, speaker_id, created_at FROM presentations WHERE id = ?1",
            [id],
            presentation_from_row,
        )
        .optional()?)
}

/// All presentations with their speaker's username, oldest first.
pub fn list_presentations(conn: &Connection) -> Result<Vec<(Presentation, String)>, ApiError> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.title, p.description, p.speaker_id, p.created_at, u.username
         FROM presentations p INNER JOIN users u ON u.id = p.speaker_id
         ORDER BY p.id ASC",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((presentation_from_row(row)?, row.get::<_, String>(5)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn update_presentation(
    conn: &Connection,
    id: i64,
    title: Option<&str>,
    description: Option<&str>,
) -> Result<(), ApiError> {
    conn.execute(
        "UPDATE presentations SET title = COALESCE(?1, title), description = COALESCE(?2, description)
         WHERE id = ?3",
        params![title, description, id],
    )?;
    Ok(())
}

pub fn delete_presentation(conn: &Connection, id: i64) -> Result<bool, ApiError> {
    Ok(conn.execute("DELETE FROM presentations WHERE id = ?1", [id])? > 0)
}

// --- Attendees ---

/// Registered listeners of a presentation as (user_id, username).
pub fn listeners_of(conn: &Connection, presentation_id: i64) -> Result<Vec<(i64, String)>, ApiError> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.username FROM presentation_listeners pl
         INNER JOIN users u ON u.id = pl.user_id
         WHERE pl.presentation_id = ?1
         ORDER BY u.id ASC",
    )?;
    let rows = stmt
        .query_map([presentation_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn is_listener_of(conn: &Connection, presentation_id: i64, user_id: i64) -> Result<bool, ApiError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM presentation_listeners WHERE presentation_id = ?1 AND user_id = ?2",
        [presentation_id, user_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Returns false if the listener was already associated.
pub fn add_listener(conn: &Connection, presentation_id: i64, user_id: i64) -> Result<bool, ApiError> {
    let now = Utc::now().to_rfc3339();
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO presentation_listeners (presentation_id, user_id, added_at) VALUES (?1, ?2, ?3)",
        params![presentation_id, user_id, now],
    )?;
    Ok(inserted > 0)
}

/// Returns false if the listener was not associated.
pub fn remove_listener(conn: &Connection, presentation_id: i64, user_id: i64) -> Result<bool, ApiError> {
    let removed = conn.execute(
        "DELETE FROM presentation_listeners WHERE presentation_id = ?1 AND user_id = ?2",
        [presentation_id, user_id],
    )?;
    Ok(removed > 0)
}

// --- Questions ---

fn question_from_row(row: &Row<'_>) -> rusqlite::Result<Question> {
    let options: Option<String> = row.get(4)?;
    Ok(Question {
        id: row.get(0)?,
        presentation_id: row.get(1)?,
        question_text: row.get(2)?,
        question_type: row.get(3)?,
        options: options.and_then(|raw| serde_json::from_str(&raw).ok()),
        correct_answer: row.get(5)?,
        is_active: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const QUESTION_COLUMNS: &str =
    "id, presentation_id, question_text, question_type, options, correct_answer, is_active, created_at";

/// Persist a new question. New questions are always active.
pub fn insert_question(
    conn: &Connection,
    presentation_id: i64,
    question_text: &str,
    question_type: QuestionType,
    options: Option<&[String]>,
    correct_answer: Option<&str>,
) -> Result<Question, ApiError> {
    let now = Utc::now().to_rfc3339();
    let options_json = options
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| ApiError::Upstream(format!("encode options: {}", e)))?;
    conn.execute(
        "INSERT INTO questions (presentation_id, question_text, question_type, options, correct_answer, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
        params![presentation_id, question_text, question_type, options_json, correct_answer, now],
    )?;
    Ok(Question {
        id: conn.last_insert_rowid(),
        presentation_id,
        question_text: question_text.to_string(),
        question_type,
        options: options.map(|o| o.to_vec()),
        correct_answer: correct_answer.map(str::to_string),
        is_active: true,
        created_at: now,
    })
}

pub fn get_question(conn: &Connection, id: i64) -> Result<Option<Question>, ApiError> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM questions WHERE id = ?1", QUESTION_COLUMNS),
            [id],
            question_from_row,
        )
        .optional()?)
}

pub fn list_questions(
    conn: &Connection,
    presentation_id: i64,
    active_only: bool,
) -> Result<Vec<Question>, ApiError> {
    let sql = if active_only {
        format!(
            "SELECT {} FROM questions WHERE presentation_id = ?1 AND is_active = 1 ORDER BY id ASC",
            QUESTION_COLUMNS
        )
    } else {
        format!(
            "SELECT {} FROM questions WHERE presentation_id = ?1 ORDER BY id ASC",
            QUESTION_COLUMNS
        )
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([presentation_id], question_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn deactivate_question(conn: &Connection, id: i64) -> Result<(), ApiError> {
    conn.execute("UPDATE questions SET is_active = 0 WHERE id = ?1", [id])?;
    Ok(())
}

// --- Answers ---

fn answer_from_row(row: &Row<'_>) -> rusqlite::Result<Answer> {
    Ok(Answer {
        id: row.get(0)?,
        question_id: row.get(1)?,
        user_id: row.get(2)?,
        answer_text: row.get(3)?,
        is_correct: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Record a listener's answer atomically.
///
/// The active check, duplicate check and insert share one transaction, and the
/// unique index on (question_id, user_id) rejects a concurrent insert that
/// slipped past the check.
pub fn record_answer(
    conn: &mut Connection,
    question_id: i64,
    user_id: i64,
    answer_text: &str,
    is_correct: Option<bool>,
) -> Result<i64, ApiError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let active: Option<bool> = tx
        .query_row("SELECT is_active FROM questions WHERE id = ?1", [question_id], |row| {
            row.get(0)
        })
        .optional()?;
    if active != Some(true) {
        return Err(ApiError::not_found("Question not found or not active"));
    }

    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM answers WHERE question_id = ?1 AND user_id = ?2",
            [question_id, user_id],
            |row| row.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Err(ApiError::conflict("You have already answered this question"));
    }

    let now = Utc::now().to_rfc3339();
    match tx.execute(
        "INSERT INTO answers (question_id, user_id, answer_text, is_correct, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![question_id, user_id, answer_text, is_correct, now],
    ) {
        Ok(_) => {}
        Err(e) if is_constraint_violation(&e) => {
            return Err(ApiError::conflict("You have already answered this question"))
        }
        Err(e) => return Err(e.into()),
    }
    let answer_id = tx.last_insert_rowid();
    tx.commit()?;
    Ok(answer_id)
}

pub fn answers_for_question(conn: &Connection, question_id: i64) -> Result<Vec<Answer>, ApiError> {
    let mut stmt = conn.prepare(
        "SELECT id, question_id, user_id, answer_text, is_correct, created_at
         FROM answers WHERE question_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map([question_id], answer_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn answer_for_user(
    conn: &Connection,
    question_id: i64,
    user_id: i64,
) -> Result<Option<Answer>, ApiError> {
    Ok(conn
        .query_row(
            "SELECT id, question_id, user_id, answer_text, is_correct, created_at
             FROM answers WHERE question_id = ?1 AND user_id = ?2",
            [question_id, user_id],
            answer_from_row,
        )
        .optional()?)
}

// --- Feedback ---

pub fn record_feedback(
    conn: &Connection,
    presentation_id: i64,
    user_id: i64,
    feedback_type: &str,
    content: Option<&str>,
) -> Result<Feedback, ApiError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO feedback (presentation_id, user_id, feedback_type, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![presentation_id, user_id, feedback_type, content, now],
    )?;
    Ok(Feedback {
        id: conn.last_insert_rowid(),
        presentation_id,
        user_id,
        feedback_type: feedback_type.to_string(),
        content: content.map(str::to_string),
        created_at: now,
    })
}

pub fn feedback_for_presentation(conn: &Connection, presentation_id: i64) -> Result<Vec<Feedback>, ApiError> {
    let mut stmt = conn.prepare(
        "SELECT id, presentation_id, user_id, feedback_type, content, created_at
         FROM feedback WHERE presentation_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map([presentation_id], |row| {
            Ok(Feedback {
                id: row.get(0)?,
                presentation_id: row.get(1)?,
                user_id: row.get(2)?,
                feedback_type: row.get(3)?,
                content: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
