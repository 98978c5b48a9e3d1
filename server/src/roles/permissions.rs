use bitflags::bitflags;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::db::models::User;
use crate::db::{self, store, DbPool};
use crate::error::ApiError;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        const CREATE_PRESENTATIONS = 1 << 0;  // 0x01
        const MANAGE_QUESTIONS     = 1 << 1;  // 0x02
        const ANSWER_QUESTIONS     = 1 << 2;  // 0x04
        const SEND_FEEDBACK        = 1 << 3;  // 0x08
        const VIEW_STATS           = 1 << 4;  // 0x10
        const MANAGE_LISTENERS     = 1 << 5;  // 0x20
        const EDIT_PRESENTATIONS   = 1 << 6;  // 0x40
        /// Lifts the ownership scope: the holder acts on every presentation.
        const ANY_PRESENTATION     = 1 << 7;  // 0x80
    }
}

/// Stored account role. The role a client claims on `join` is cross-checked against this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Organizer,
    Speaker,
    Listener,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "organizer" => Some(Self::Organizer),
            "speaker" => Some(Self::Speaker),
            "listener" => Some(Self::Listener),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organizer => "organizer",
            Self::Speaker => "speaker",
            Self::Listener => "listener",
        }
    }

    pub fn capabilities(self) -> Capabilities {
        match self {
            Self::Organizer => {
                Capabilities::VIEW_STATS
                    | Capabilities::MANAGE_LISTENERS
                    | Capabilities::EDIT_PRESENTATIONS
                    | Capabilities::ANY_PRESENTATION
            }
            // Speaker capabilities other than CREATE_PRESENTATIONS are scoped to owned presentations.
            Self::Speaker => {
                Capabilities::CREATE_PRESENTATIONS
                    | Capabilities::MANAGE_QUESTIONS
                    | Capabilities::VIEW_STATS
                    | Capabilities::MANAGE_LISTENERS
                    | Capabilities::EDIT_PRESENTATIONS
            }
            Self::Listener => Capabilities::ANSWER_QUESTIONS | Capabilities::SEND_FEEDBACK,
        }
    }

    pub fn can(self, required: Capabilities) -> bool {
        self.capabilities().contains(required)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Role::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown role '{}'", s).into()))
    }
}

/// The role that carries `required`, used in forbidden messages.
fn role_named_for(required: Capabilities) -> &'static str {
    [Role::Speaker, Role::Listener, Role::Organizer]
        .into_iter()
        .find(|role| role.can(required))
        .map(|role| role.as_str())
        .unwrap_or("privileged")
}

/// Load the caller's stored account, 404 if it no longer exists.
pub async fn current_user(db: &DbPool, user_id: i64) -> Result<User, ApiError> {
    db::run(db, move |conn| store::get_user(conn, user_id))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

/// Check that a user holds the required capability.
/// Reads the current role from the DB (not the token) so role changes apply immediately.
/// Returns the stored user so handlers can run ownership checks without a second lookup.
pub async fn require_capability(
    db: &DbPool,
    user_id: i64,
    required: Capabilities,
) -> Result<User, ApiError> {
    let user = current_user(db, user_id).await?;

    if user.role.can(required) {
        Ok(user)
    } else {
        Err(ApiError::forbidden(format!(
            "'{}' role required",
            role_named_for(required)
        )))
    }
}
