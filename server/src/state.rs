use crate::auth::jwt::IdentityVerifier;
use crate::db::DbPool;
use crate::session::SessionHandle;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// Verifies and issues bearer credentials
    pub verifier: IdentityVerifier,
    /// Channel into the session loop that owns all room membership
    pub sessions: SessionHandle,
}
