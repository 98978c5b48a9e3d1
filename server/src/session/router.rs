use std::collections::HashMap;

use super::registry::RoomRegistry;
use super::ConnectionId;
use crate::ws::events::ServerEvent;
use crate::ws::ConnectionSender;

/// Fan-out of events to live connections.
///
/// Delivery is fire-and-forget: a closed channel means the receiver is gone
/// and the event is dropped.
#[derive(Debug, Default)]
pub struct BroadcastRouter {
    senders: HashMap<ConnectionId, ConnectionSender>,
}

impl BroadcastRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, conn: ConnectionId, sender: ConnectionSender) {
        self.senders.insert(conn, sender);
    }

    pub fn unregister(&mut self, conn: ConnectionId) {
        self.senders.remove(&conn);
    }

    #[cfg(test)]
    fn is_registered(&self, conn: ConnectionId) -> bool {
        self.senders.contains_key(&conn)
    }

    /// Returns true if the event was handed to a live connection.
    pub fn emit_to_connection(&self, conn: ConnectionId, event: &ServerEvent) -> bool {
        let Some(sender) = self.senders.get(&conn) else {
            return false;
        };
        match event.to_message() {
            Some(msg) => sender.send(msg).is_ok(),
            None => false,
        }
    }

    /// Returns the number of connections the event was handed to.
    pub fn emit_to_room(&self, rooms: &RoomRegistry, presentation_id: i64, event: &ServerEvent) -> usize {
        self.fan_out(rooms.members(presentation_id), event)
    }

    pub fn emit_to_room_except(
        &self,
        rooms: &RoomRegistry,
        presentation_id: i64,
        event: &ServerEvent,
        exclude: ConnectionId,
    ) -> usize {
        let members = rooms
            .members(presentation_id)
            .into_iter()
            .filter(|conn| *conn != exclude)
            .collect();
        self.fan_out(members, event)
    }

    fn fan_out(&self, members: Vec<ConnectionId>, event: &ServerEvent) -> usize {
        if members.is_empty() {
            return 0;
        }
        let Some(msg) = event.to_message() else {
            return 0;
        };
        let mut delivered = 0;
        for conn in members {
            if let Some(sender) = self.senders.get(&conn) {
                if sender.send(msg.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        tracing::debug!(event = event.name(), delivered, "Room broadcast");
        delivered
    }
}
