use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use super::ConnectionId;

/// Membership of one presentation room.
#[derive(Debug, Default)]
pub struct Room {
    pub speaker: Option<ConnectionId>,
    pub listeners: HashSet<ConnectionId>,
    /// Set while the room has no members; drives idle eviction.
    emptied_at: Option<Instant>,
}

impl Room {
    pub fn is_empty(&self) -> bool {
        self.speaker.is_none() && self.listeners.is_empty()
    }

    fn touch(&mut self) {
        self.emptied_at = if self.is_empty() { Some(Instant::now()) } else { None };
    }
}

/// In-memory map of presentation id to room membership.
///
/// Owned by the session loop; there is no interior locking.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<i64, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, presentation_id: i64) -> &mut Room {
        self.rooms.entry(presentation_id).or_insert_with(|| Room {
            emptied_at: Some(Instant::now()),
            ..Room::default()
        })
    }

    /// Put a connection in the speaker slot. Returns the connection it displaced.
    pub fn set_speaker(&mut self, presentation_id: i64, conn: ConnectionId) -> Option<ConnectionId> {
        let room = self.get_or_create(presentation_id);
        let previous = room.speaker.replace(conn);
        room.touch();
        previous.filter(|prev| *prev != conn)
    }

    /// Returns false if the connection was already a listener.
    pub fn add_listener(&mut self, presentation_id: i64, conn: ConnectionId) -> bool {
        let room = self.get_or_create(presentation_id);
        let added = room.listeners.insert(conn);
        room.touch();
        added
    }

    pub fn remove_listener(&mut self, presentation_id: i64, conn: ConnectionId) -> bool {
        match self.rooms.get_mut(&presentation_id) {
            Some(room) => {
                let removed = room.listeners.remove(&conn);
                room.touch();
                removed
            }
            None => false,
        }
    }

    /// Clear the speaker slot only if `conn` still holds it.
    pub fn clear_speaker_if_matches(&mut self, presentation_id: i64, conn: ConnectionId) -> bool {
        match self.rooms.get_mut(&presentation_id) {
            Some(room) if room.speaker == Some(conn) => {
                room.speaker = None;
                room.touch();
                true
            }
            _ => false,
        }
    }

    pub fn listener_count(&self, presentation_id: i64) -> usize {
        self.rooms
            .get(&presentation_id)
            .map(|room| room.listeners.len())
            .unwrap_or(0)
    }

    pub fn speaker_of(&self, presentation_id: i64) -> Option<ConnectionId> {
        self.rooms.get(&presentation_id).and_then(|room| room.speaker)
    }

    /// Speaker (if any) followed by all listeners.
    pub fn members(&self, presentation_id: i64) -> Vec<ConnectionId> {
        match self.rooms.get(&presentation_id) {
            Some(room) => room
                .speaker
                .into_iter()
                .chain(room.listeners.iter().copied())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Drop rooms that have been empty for at least `idle`. Returns the evicted ids.
    pub fn evict_idle(&mut self, now: Instant, idle: Duration) -> Vec<i64> {
        let expired: Vec<i64> = self
            .rooms
            .iter()
            .filter(|(_, room)| {
                room.emptied_at
                    .is_some_and(|at| now.saturating_duration_since(at) >= idle)
            })
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.rooms.remove(id);
        }
        expired
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_most_recent_speaker_wins() {
        let mut reg = RoomRegistry::new();
        let (a, b, c) = (ConnectionId::new(), ConnectionId::new(), ConnectionId::new());
        assert_eq!(reg.set_speaker(1, a), None);
        assert_eq!(reg.set_speaker(1, b), Some(a));
        assert_eq!(reg.set_speaker(1, c), Some(b));
        assert_eq!(reg.speaker_of(1), Some(c));
    }

    #[test]
    fn test_same_speaker_rejoin_displaces_nobody() {
        let mut reg = RoomRegistry::new();
        let a = ConnectionId::new();
        reg.set_speaker(1, a);
        assert_eq!(reg.set_speaker(1, a), None);
    }

    #[test]
    fn test_listener_count_tracks_membership() {
        let mut reg = RoomRegistry::new();
        let (a, b) = (ConnectionId::new(), ConnectionId::new());
        assert_eq!(reg.listener_count(1), 0);
        assert!(reg.add_listener(1, a));
        assert!(!reg.add_listener(1, a));
        assert!(reg.add_listener(1, b));
        assert_eq!(reg.listener_count(1), 2);
        assert!(reg.remove_listener(1, a));
        assert!(!reg.remove_listener(1, a));
        assert!(!reg.remove_listener(2, b));
        assert_eq!(reg.listener_count(1), 1);
    }

    #[test]
    fn test_clear_speaker_only_when_matching() {
        let mut reg = RoomRegistry::new();
        let (old, new) = (ConnectionId::new(), ConnectionId::new());
        reg.set_speaker(1, old);
        reg.set_speaker(1, new);
        assert!(!reg.clear_speaker_if_matches(1, old));
        assert_eq!(reg.speaker_of(1), Some(new));
        assert!(reg.clear_speaker_if_matches(1, new));
        assert_eq!(reg.speaker_of(1), None);
    }

    #[test]
    fn test_members_lists_speaker_and_listeners() {
        let mut reg = RoomRegistry::new();
        let (s, l) = (ConnectionId::new(), ConnectionId::new());
        reg.set_speaker(5, s);
        reg.add_listener(5, l);
        let members = reg.members(5);
        assert_eq!(members.len(), 2);
        assert_eq!(members[0], s);
        assert!(members.contains(&l));
        assert!(reg.members(6).is_empty());
    }

    #[test]
    fn test_only_empty_rooms_are_evicted() {
        let mut reg = RoomRegistry::new();
        let (a, b) = (ConnectionId::new(), ConnectionId::new());
        reg.add_listener(1, a);
        reg.add_listener(2, b);
        reg.remove_listener(2, b);

        let later = Instant::now() + Duration::from_secs(5);
        assert!(reg.evict_idle(later, Duration::from_secs(60)).is_empty());
        assert_eq!(reg.evict_idle(later, Duration::from_secs(1)), vec![2]);
        assert_eq!(reg.room_count(), 1);
        assert_eq!(reg.listener_count(1), 1);
    }

    #[test]
    fn test_rejoined_room_is_not_evicted() {
        let mut reg = RoomRegistry::new();
        let a = ConnectionId::new();
        reg.set_speaker(1, a);
        reg.clear_speaker_if_matches(1, a);
        reg.set_speaker(1, a);
        let later = Instant::now() + Duration::from_secs(5);
        assert!(reg.evict_idle(later, Duration::ZERO).is_empty());
    }
}
