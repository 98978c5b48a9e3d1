/// Database row types for all tables.
/// These correspond 1:1 to the SQLite schema defined in migrations.rs.
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::roles::permissions::Role;

/// User record in the users table
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: String,
}

/// Presentation owned by exactly one speaker
#[derive(Debug, Clone)]
pub struct Presentation {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub speaker_id: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    #[default]
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MultipleChoice => "multiple_choice",
            Self::TrueFalse => "true_false",
            Self::ShortAnswer => "short_answer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "multiple_choice" => Some(Self::MultipleChoice),
            "true_false" => Some(Self::TrueFalse),
            "short_answer" => Some(Self::ShortAnswer),
            _ => None,
        }
    }
}

impl ToSql for QuestionType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for QuestionType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        QuestionType::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown question type '{}'", s).into()))
    }
}

/// Quiz question. `options` is stored as a JSON array string.
#[derive(Debug, Clone)]
pub struct Question {
    pub id: i64,
    pub presentation_id: i64,
    pub question_text: String,
    pub question_type: QuestionType,
    pub options: Option<Vec<String>>,
    pub correct_answer: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

/// A listener's answer. `is_correct` is None when the question has no stored correct answer.
#[derive(Debug, Clone)]
pub struct Answer {
    pub id: i64,
    pub question_id: i64,
    pub user_id: i64,
    pub answer_text: String,
    pub is_correct: Option<bool>,
    pub created_at: String,
}

/// Typed instant-feedback record ("too_fast", "too_slow", ...)
#[derive(Debug, Clone)]
pub struct Feedback {
    pub id: i64,
    pub presentation_id: i64,
    pub user_id: i64,
    pub feedback_type: String,
    pub content: Option<String>,
    pub created_at: String,
}
