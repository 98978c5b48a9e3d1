use axum::extract::ws::Message;
use tokio::sync::mpsc;

use crate::db::{self, store};
use crate::error::{ApiError, AuthError};
use crate::feedback::submit::{record_and_deliver, Delivery};
use crate::roles::permissions::Role;
use crate::session::{ConnectionId, RoomRole};
use crate::state::AppState;
use crate::ws::events::{ClientEvent, FeedbackRequest, JoinRequest, ServerEvent};

/// Per-socket state owned by the connection actor.
pub struct ConnectionContext {
    pub conn_id: ConnectionId,
    /// Verified user, either from the inline token or the last successful join.
    pub user_id: Option<i64>,
    pub tx: mpsc::UnboundedSender<Message>,
}

impl ConnectionContext {
    pub fn send(&self, event: &ServerEvent) {
        if let Some(msg) = event.to_message() {
            let _ = self.tx.send(msg);
        }
    }
}

/// Decode one text frame and run its handler to completion.
/// Failures become an `error` event; the connection stays open.
pub async fn handle_text_message(text: &str, ctx: &mut ConnectionContext, state: &AppState) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(conn_id = %ctx.conn_id, error = %e, "Malformed client event");
            ctx.send(&ServerEvent::error(format!("Malformed event: {}", e)));
            return;
        }
    };

    let result = match event {
        ClientEvent::Join(req) => handle_join(req, ctx, state).await,
        ClientEvent::Leave => handle_leave(ctx, state).await,
        ClientEvent::Feedback(req) => handle_feedback(req, ctx, state).await,
    };

    if let Err(err) = result {
        match &err {
            ApiError::Upstream(detail) => {
                tracing::error!(conn_id = %ctx.conn_id, error = %detail, "Event handler failed")
            }
            other => tracing::debug!(conn_id = %ctx.conn_id, error = %other, "Event rejected"),
        }
        ctx.send(&ServerEvent::error(err.public_message()));
    }
}

/// Join handshake: verify, check storage, cross-check the claimed role, then seat.
async fn handle_join(req: JoinRequest, ctx: &mut ConnectionContext, state: &AppState) -> Result<(), ApiError> {
    let user_id = match req.credential.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(credential) => state.verifier.verify(credential)?.user_id,
        None => ctx.user_id.ok_or(AuthError::Missing)?,
    };

    let presentation_id = req.presentation_id;
    let (presentation, user) = db::run(&state.db, move |conn| {
        let presentation = store::get_presentation(conn, presentation_id)?;
        let user = store::get_user(conn, user_id)?;
        Ok((presentation, user))
    })
    .await?;
    let presentation = presentation.ok_or_else(|| ApiError::not_found("Presentation not found"))?;
    let user = user.ok_or_else(|| ApiError::not_found("User not found"))?;

    match req.role {
        RoomRole::Speaker => {
            if user.role != Role::Speaker || presentation.speaker_id != user.id {
                return Err(ApiError::forbidden(
                    "Only the presentation's speaker can join as speaker",
                ));
            }
        }
        RoomRole::Listener => {
            if !matches!(user.role, Role::Listener | Role::Organizer) {
                return Err(ApiError::forbidden("'listener' role required"));
            }
        }
    }

    state
        .sessions
        .join(ctx.conn_id, user.id, presentation.id, req.role)
        .await?;
    ctx.user_id = Some(user.id);
    Ok(())
}

async fn handle_leave(ctx: &mut ConnectionContext, state: &AppState) -> Result<(), ApiError> {
    match state.sessions.leave(ctx.conn_id).await? {
        Some(presentation_id) => {
            tracing::info!(conn_id = %ctx.conn_id, presentation_id, "Left room");
            Ok(())
        }
        None => Err(ApiError::validation("Not joined to any presentation")),
    }
}

async fn handle_feedback(req: FeedbackRequest, ctx: &mut ConnectionContext, state: &AppState) -> Result<(), ApiError> {
    let membership = state
        .sessions
        .membership(ctx.conn_id)
        .await?
        .filter(|m| m.role == RoomRole::Listener)
        .ok_or_else(|| ApiError::forbidden("Join the presentation as a listener to send feedback"))?;
    let presentation_id = req.presentation_id.unwrap_or(membership.presentation_id);
    if membership.presentation_id != presentation_id {
        return Err(ApiError::forbidden("Joined to a different presentation"));
    }

    let Delivery { delivered, .. } = record_and_deliver(
        state,
        membership.user_id,
        presentation_id,
        req.feedback_type,
        req.content,
    )
    .await?;

    let message = if delivered {
        "Feedback delivered to the speaker"
    } else {
        "Speaker is offline, feedback recorded"
    };
    ctx.send(&ServerEvent::FeedbackResult {
        success: true,
        message: message.to_string(),
        delivered,
    });
    Ok(())
}
