use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    response::Response,
};
use serde::Deserialize;

use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for the WebSocket upgrade.
/// The token is optional: a connection may authenticate later with its `join` event.
#[derive(Debug, Default, Deserialize)]
pub struct WsAuthQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// GET /ws?token=JWT
/// WebSocket upgrade endpoint. A bad inline token does not refuse the upgrade;
/// the connection starts unauthenticated instead.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = match params.token.as_deref() {
        Some(token) if !token.is_empty() => match state.verifier.verify(token) {
            Ok(identity) => {
                tracing::info!(
                    user_id = identity.user_id,
                    role = %identity.role,
                    "WebSocket connection authenticated inline"
                );
                Some(identity.user_id)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Inline WebSocket credential rejected, continuing unauthenticated");
                None
            }
        },
        _ => None,
    };

    ws.on_upgrade(move |socket| actor::run_connection(socket, state, user_id))
}
