pub mod attendees;
pub mod crud;

use crate::db::models::{Presentation, User};
use crate::db::{self, store, DbPool};
use crate::error::ApiError;
use crate::roles::permissions::{Capabilities, Role};

/// Fetch a presentation or fail with 404.
pub async fn load_presentation(db: &DbPool, presentation_id: i64) -> Result<Presentation, ApiError> {
    db::run(db, move |conn| store::get_presentation(conn, presentation_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Presentation not found"))
}

/// Whether `user` holds `required` for this presentation.
/// Without ANY_PRESENTATION the capability only covers presentations the user owns.
pub fn can_manage(user: &User, presentation: &Presentation, required: Capabilities) -> bool {
    user.role.can(required)
        && (user.role.can(Capabilities::ANY_PRESENTATION) || presentation.speaker_id == user.id)
}
