pub mod manager;
pub mod registry;
pub mod router;

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use uuid::Uuid;

use crate::config::RoomsConfig;
use crate::error::ApiError;
use crate::ws::events::ServerEvent;
use crate::ws::ConnectionSender;

pub use manager::{ConnectionState, Membership, RoomSnapshot, SessionManager};

/// Opaque per-socket identifier (UUIDv7, time ordered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Role a connection holds inside a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomRole {
    Speaker,
    Listener,
}

impl RoomRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomRole::Speaker => "speaker",
            RoomRole::Listener => "listener",
        }
    }
}

impl std::fmt::Display for RoomRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audience of a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastScope {
    Connection(ConnectionId),
    Room(i64),
    RoomExcept {
        presentation_id: i64,
        exclude: ConnectionId,
    },
}

/// Commands sent from connection actors and HTTP handlers to the session loop.
#[derive(Debug)]
pub enum SessionCommand {
    Connect {
        conn_id: ConnectionId,
        sender: ConnectionSender,
        user_id: Option<i64>,
    },
    /// Credential and storage checks are done by the caller before this is sent.
    Join {
        conn_id: ConnectionId,
        user_id: i64,
        presentation_id: i64,
        role: RoomRole,
        reply: oneshot::Sender<bool>,
    },
    Leave {
        conn_id: ConnectionId,
        reply: oneshot::Sender<Option<i64>>,
    },
    Disconnect(ConnectionId),
    Emit {
        scope: BroadcastScope,
        event: ServerEvent,
    },
    DeliverToSpeaker {
        presentation_id: i64,
        event: ServerEvent,
        reply: oneshot::Sender<bool>,
    },
    GetMembership {
        conn_id: ConnectionId,
        reply: oneshot::Sender<Option<Membership>>,
    },
    GetSnapshot {
        presentation_id: i64,
        reply: oneshot::Sender<RoomSnapshot>,
    },
}

/// Cloneable handle to the session loop.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
}

fn loop_unavailable() -> ApiError {
    ApiError::Upstream("session loop unavailable".to_string())
}

impl SessionHandle {
    fn send(&self, cmd: SessionCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            tracing::warn!("Session loop is gone, command dropped");
        }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand) -> Result<T, ApiError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(build(reply_tx))
            .map_err(|_| loop_unavailable())?;
        reply_rx.await.map_err(|_| loop_unavailable())
    }

    pub fn connect(&self, conn_id: ConnectionId, sender: ConnectionSender, user_id: Option<i64>) {
        self.send(SessionCommand::Connect {
            conn_id,
            sender,
            user_id,
        });
    }

    /// Resolves once the session loop has seated the connection and queued its `joined` event.
    pub async fn join(
        &self,
        conn_id: ConnectionId,
        user_id: i64,
        presentation_id: i64,
        role: RoomRole,
    ) -> Result<(), ApiError> {
        let seated = self
            .request(|reply| SessionCommand::Join {
                conn_id,
                user_id,
                presentation_id,
                role,
                reply,
            })
            .await?;
        if seated {
            Ok(())
        } else {
            Err(ApiError::Upstream(format!("connection {} is not registered", conn_id)))
        }
    }

    pub async fn leave(&self, conn_id: ConnectionId) -> Result<Option<i64>, ApiError> {
        self.request(|reply| SessionCommand::Leave { conn_id, reply }).await
    }

    pub fn disconnect(&self, conn_id: ConnectionId) {
        self.send(SessionCommand::Disconnect(conn_id));
    }

    pub fn emit(&self, scope: BroadcastScope, event: ServerEvent) {
        self.send(SessionCommand::Emit { scope, event });
    }

    pub fn emit_to_room(&self, presentation_id: i64, event: ServerEvent) {
        self.emit(BroadcastScope::Room(presentation_id), event);
    }

    /// True if the room's speaker was connected and the event was queued for it.
    pub async fn deliver_to_speaker(&self, presentation_id: i64, event: ServerEvent) -> Result<bool, ApiError> {
        self.request(|reply| SessionCommand::DeliverToSpeaker {
            presentation_id,
            event,
            reply,
        })
        .await
    }

    pub async fn membership(&self, conn_id: ConnectionId) -> Result<Option<Membership>, ApiError> {
        self.request(|reply| SessionCommand::GetMembership { conn_id, reply })
            .await
    }

    pub async fn snapshot(&self, presentation_id: i64) -> Result<RoomSnapshot, ApiError> {
        self.request(|reply| SessionCommand::GetSnapshot {
            presentation_id,
            reply,
        })
        .await
    }
}

/// Spawn the session loop on the current runtime.
pub fn spawn_session_loop(config: RoomsConfig) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_session_loop(SessionManager::new(), cmd_rx, config));
    SessionHandle { cmd_tx }
}

/// Run the session loop.
///
/// This is the only task that touches room membership. It processes commands
/// in arrival order and periodically evicts rooms that stayed empty.
pub async fn run_session_loop(
    mut manager: SessionManager,
    mut cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    config: RoomsConfig,
) {
    let idle = Duration::from_secs(config.idle_eviction_secs);
    let mut sweep = interval(Duration::from_secs(config.sweep_interval_secs.max(1)));
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        idle_eviction_secs = config.idle_eviction_secs,
        sweep_interval_secs = config.sweep_interval_secs,
        "Session loop started"
    );

    loop {
        tokio::select! {
            _ = sweep.tick() => {
                let evicted = manager.sweep(Instant::now(), idle);
                if !evicted.is_empty() {
                    tracing::info!(
                        rooms = ?evicted,
                        remaining = manager.room_count(),
                        connections = manager.connection_count(),
                        "Evicted idle rooms"
                    );
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(cmd) => handle_session_command(&mut manager, cmd),
                    None => {
                        tracing::info!("Session command channel closed, shutting down");
                        break;
                    }
                }
            }
        }
    }
}

fn handle_session_command(manager: &mut SessionManager, cmd: SessionCommand) {
    match cmd {
        SessionCommand::Connect {
            conn_id,
            sender,
            user_id,
        } => manager.connect(conn_id, sender, user_id),
        SessionCommand::Join {
            conn_id,
            user_id,
            presentation_id,
            role,
            reply,
        } => {
            let seated = manager.join(conn_id, user_id, presentation_id, role);
            let _ = reply.send(seated);
        }
        SessionCommand::Leave { conn_id, reply } => {
            let _ = reply.send(manager.leave(conn_id));
        }
        SessionCommand::Disconnect(conn_id) => manager.disconnect(conn_id),
        SessionCommand::Emit { scope, event } => {
            let delivered = manager.emit(scope, &event);
            tracing::debug!(event = event.name(), ?scope, delivered, "Emitted");
        }
        SessionCommand::DeliverToSpeaker {
            presentation_id,
            event,
            reply,
        } => {
            let _ = reply.send(manager.deliver_to_speaker(presentation_id, &event));
        }
        SessionCommand::GetMembership { conn_id, reply } => {
            let _ = reply.send(manager.membership(conn_id));
        }
        SessionCommand::GetSnapshot {
            presentation_id,
            reply,
        } => {
            let _ = reply.send(manager.snapshot(presentation_id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::Message;

    fn test_config() -> RoomsConfig {
        RoomsConfig {
            idle_eviction_secs: 600,
            sweep_interval_secs: 60,
        }
    }

    #[tokio::test]
    async fn test_join_is_acknowledged_before_reply() {
        let handle = spawn_session_loop(test_config());
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let conn = ConnectionId::new();
        handle.connect(conn, tx, None);

        handle.join(conn, 5, 1, RoomRole::Speaker).await.unwrap();
        // joined and room_info are already queued when join resolves
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());

        let membership = handle.membership(conn).await.unwrap().unwrap();
        assert_eq!(membership.presentation_id, 1);
        assert_eq!(membership.role, RoomRole::Speaker);
        assert!(handle.snapshot(1).await.unwrap().speaker_connected);
    }

    #[tokio::test]
    async fn test_join_unknown_connection_fails() {
        let handle = spawn_session_loop(test_config());
        let err = handle
            .join(ConnectionId::new(), 1, 1, RoomRole::Listener)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_disconnect_then_leave_reports_nothing() {
        let handle = spawn_session_loop(test_config());
        let (tx, _rx) = mpsc::unbounded_channel::<Message>();
        let conn = ConnectionId::new();
        handle.connect(conn, tx, Some(2));
        handle.join(conn, 2, 1, RoomRole::Listener).await.unwrap();
        handle.disconnect(conn);
        assert_eq!(handle.leave(conn).await.unwrap(), None);
        assert_eq!(handle.snapshot(1).await.unwrap().listeners_count, 0);
    }

    #[tokio::test]
    async fn test_deliver_to_speaker_without_speaker() {
        let handle = spawn_session_loop(test_config());
        let delivered = handle
            .deliver_to_speaker(1, ServerEvent::error("x"))
            .await
            .unwrap();
        assert!(!delivered);
    }
}
