//! Connection lifecycle and room membership state machine.
//!
//! A connection moves `Unauthenticated -> Authenticated -> Joined(speaker | listener)`
//! and leaves the table on disconnect. All transitions are synchronous; the
//! session loop in [`super::run_session_loop`] is the only caller.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::registry::RoomRegistry;
use super::router::BroadcastRouter;
use super::{BroadcastScope, ConnectionId, RoomRole};
use crate::ws::events::{NotificationKind, ServerEvent};
use crate::ws::ConnectionSender;

/// Where a joined connection sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    pub user_id: i64,
    pub presentation_id: i64,
    pub role: RoomRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unauthenticated,
    Authenticated { user_id: i64 },
    Joined(Membership),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub speaker_connected: bool,
    pub listeners_count: usize,
}

#[derive(Debug)]
struct ConnectionEntry {
    user_id: Option<i64>,
    membership: Option<Membership>,
}

#[derive(Debug, Default)]
pub struct SessionManager {
    rooms: RoomRegistry,
    router: BroadcastRouter,
    connections: HashMap<ConnectionId, ConnectionEntry>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted socket. `user_id` is set when the socket
    /// carried a valid inline credential.
    pub fn connect(&mut self, conn: ConnectionId, sender: ConnectionSender, user_id: Option<i64>) {
        self.router.register(conn, sender);
        self.connections.insert(
            conn,
            ConnectionEntry {
                user_id,
                membership: None,
            },
        );
        tracing::debug!(conn_id = %conn, authenticated = user_id.is_some(), "Connection registered");
    }

    pub fn state(&self, conn: ConnectionId) -> Option<ConnectionState> {
        let entry = self.connections.get(&conn)?;
        Some(match (entry.membership, entry.user_id) {
            (Some(m), _) => ConnectionState::Joined(m),
            (None, Some(user_id)) => ConnectionState::Authenticated { user_id },
            (None, None) => ConnectionState::Unauthenticated,
        })
    }

    pub fn membership(&self, conn: ConnectionId) -> Option<Membership> {
        match self.state(conn)? {
            ConnectionState::Joined(membership) => Some(membership),
            _ => None,
        }
    }

    /// Seat a verified connection in a room. Returns false for unknown connections.
    ///
    /// Re-joining the seat the connection already holds only re-acknowledges it.
    /// Joining a different room or role leaves the previous seat first.
    pub fn join(&mut self, conn: ConnectionId, user_id: i64, presentation_id: i64, role: RoomRole) -> bool {
        let Some(entry) = self.connections.get_mut(&conn) else {
            return false;
        };
        entry.user_id = Some(user_id);
        let previous = entry.membership;

        if let Some(prev) = previous {
            if prev.presentation_id == presentation_id && prev.role == role && prev.user_id == user_id {
                self.acknowledge_join(conn, presentation_id, role);
                return true;
            }
            self.detach(conn, prev);
        }

        match role {
            RoomRole::Speaker => {
                if let Some(displaced) = self.rooms.set_speaker(presentation_id, conn) {
                    if let Some(entry) = self.connections.get_mut(&displaced) {
                        entry.membership = None;
                    }
                    self.router.emit_to_connection(
                        displaced,
                        &ServerEvent::notification(
                            NotificationKind::SpeakerChanged,
                            "Another speaker connection has taken over this presentation",
                            None,
                        ),
                    );
                    tracing::info!(
                        presentation_id,
                        conn_id = %conn,
                        displaced = %displaced,
                        "Speaker slot replaced"
                    );
                }
            }
            RoomRole::Listener => {
                self.rooms.add_listener(presentation_id, conn);
                if let Some(speaker) = self.rooms.speaker_of(presentation_id) {
                    let count = self.rooms.listener_count(presentation_id);
                    self.router.emit_to_connection(
                        speaker,
                        &ServerEvent::notification(
                            NotificationKind::ListenerJoined,
                            "A new listener has joined",
                            Some(count),
                        ),
                    );
                }
            }
        }

        if let Some(entry) = self.connections.get_mut(&conn) {
            entry.membership = Some(Membership {
                user_id,
                presentation_id,
                role,
                joined_at: Utc::now(),
            });
        }
        tracing::info!(conn_id = %conn, user_id, presentation_id, role = %role, "Joined room");
        self.acknowledge_join(conn, presentation_id, role);
        true
    }

    fn acknowledge_join(&self, conn: ConnectionId, presentation_id: i64, role: RoomRole) {
        self.router
            .emit_to_connection(conn, &ServerEvent::Joined { presentation_id, role });
        if role == RoomRole::Speaker {
            let listeners_count = self.rooms.listener_count(presentation_id);
            self.router
                .emit_to_connection(conn, &ServerEvent::RoomInfo { listeners_count });
        }
    }

    /// Remove a connection from the room it occupies, notifying the speaker when a listener goes.
    fn detach(&mut self, conn: ConnectionId, membership: Membership) {
        let presentation_id = membership.presentation_id;
        match membership.role {
            RoomRole::Speaker => {
                if self.rooms.clear_speaker_if_matches(presentation_id, conn) {
                    tracing::info!(conn_id = %conn, presentation_id, "Speaker slot cleared");
                }
            }
            RoomRole::Listener => {
                if self.rooms.remove_listener(presentation_id, conn) {
                    if let Some(speaker) = self.rooms.speaker_of(presentation_id) {
                        let count = self.rooms.listener_count(presentation_id);
                        self.router.emit_to_connection(
                            speaker,
                            &ServerEvent::notification(
                                NotificationKind::ListenerLeft,
                                "A listener has left",
                                Some(count),
                            ),
                        );
                    }
                }
            }
        }
    }

    /// Explicit `leave`: back to Authenticated. Returns the room that was left.
    pub fn leave(&mut self, conn: ConnectionId) -> Option<i64> {
        let membership = self.connections.get_mut(&conn)?.membership.take()?;
        self.detach(conn, membership);
        self.router.emit_to_connection(
            conn,
            &ServerEvent::Left {
                presentation_id: membership.presentation_id,
            },
        );
        Some(membership.presentation_id)
    }

    /// Drop a connection entirely. Safe for connections that never joined or are unknown.
    pub fn disconnect(&mut self, conn: ConnectionId) {
        self.router.unregister(conn);
        if let Some(entry) = self.connections.remove(&conn) {
            if let Some(membership) = entry.membership {
                self.detach(conn, membership);
            }
            tracing::debug!(conn_id = %conn, "Connection removed");
        }
    }

    pub fn emit(&self, scope: BroadcastScope, event: &ServerEvent) -> usize {
        match scope {
            BroadcastScope::Connection(conn) => usize::from(self.router.emit_to_connection(conn, event)),
            BroadcastScope::Room(presentation_id) => {
                self.router.emit_to_room(&self.rooms, presentation_id, event)
            }
            BroadcastScope::RoomExcept {
                presentation_id,
                exclude,
            } => self
                .router
                .emit_to_room_except(&self.rooms, presentation_id, event, exclude),
        }
    }

    /// Send to the room's current speaker only. False when no speaker is connected.
    pub fn deliver_to_speaker(&self, presentation_id: i64, event: &ServerEvent) -> bool {
        match self.rooms.speaker_of(presentation_id) {
            Some(speaker) => self.router.emit_to_connection(speaker, event),
            None => false,
        }
    }

    pub fn listener_count(&self, presentation_id: i64) -> usize {
        self.rooms.listener_count(presentation_id)
    }

    pub fn snapshot(&self, presentation_id: i64) -> RoomSnapshot {
        RoomSnapshot {
            speaker_connected: self.rooms.speaker_of(presentation_id).is_some(),
            listeners_count: self.rooms.listener_count(presentation_id),
        }
    }

    pub fn sweep(&mut self, now: Instant, idle: Duration) -> Vec<i64> {
        self.rooms.evict_idle(now, idle)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.room_count()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
