//! Concurrent room registry.
//!
//! A sharded map from room id to live [`Room`] handle. Readers proceed in
//! parallel; `snapshot` copies the handles out so callers never iterate
//! while the registry is being mutated.

use crate::coordinator::room::Room;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a room by id.
    pub fn load(&self, id: &str) -> Option<Room> {
        self.rooms.get(id).map(|entry| entry.value().clone())
    }

    /// Insert a room under `id`. Returns `false` (and drops nothing but the
    /// caller's handle) if the id is already taken; an existing entry is
    /// never overwritten.
    pub fn store(&self, id: &str, room: Room) -> bool {
        match self.rooms.entry(id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(room);
                true
            }
        }
    }

    /// Remove a room by id.
    pub fn delete(&self, id: &str) {
        self.rooms.remove(id);
    }

    /// Copy out every live room handle.
    pub fn snapshot(&self) -> Vec<Room> {
        self.rooms.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_load_delete() {
        let registry = RoomRegistry::new();
        assert!(registry.load("room_1").is_none());

        let room = Room::spawn("room_1", "Room One", "u1", 16);
        assert!(registry.store("room_1", room));
        let loaded = registry.load("room_1").expect("room should be present");
        assert_eq!(loaded.id(), "room_1");
        assert_eq!(loaded.name(), "Room One");
        assert_eq!(loaded.author_id(), "u1");

        registry.delete("room_1");
        assert!(registry.load("room_1").is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn duplicate_store_is_rejected() {
        let registry = RoomRegistry::new();
        assert!(registry.store("room_1", Room::spawn("room_1", "first", "u1", 16)));
        assert!(!registry.store("room_1", Room::spawn("room_1", "second", "u2", 16)));
        assert_eq!(registry.load("room_1").unwrap().name(), "first");
    }

    #[tokio::test]
    async fn snapshot_copies_all_rooms() {
        let registry = RoomRegistry::new();
        for n in 0..3 {
            let id = format!("room_{n}");
            registry.store(&id, Room::spawn(&id, "Room", "u1", 16));
        }
        let mut ids: Vec<_> = registry
            .snapshot()
            .into_iter()
            .map(|room| room.id().to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["room_0", "room_1", "room_2"]);

        // Mutating while holding the snapshot is safe.
        for room in registry.snapshot() {
            registry.delete(room.id());
        }
        assert_eq!(registry.len(), 0);
    }
}
