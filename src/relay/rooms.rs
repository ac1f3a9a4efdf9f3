//! Room registry
//!
//! A room groups the producers broadcasting under one room token with the
//! signaling connections watching them. Rooms are created lazily on first
//! join or first produce and reclaimed once the last member leaves and no
//! producer remains.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::{mpsc, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::MediaKind;
use crate::signaling::message::PushEvent;

use super::error::RelayError;

/// Push channel into one signaling connection
pub type PushSender = mpsc::UnboundedSender<PushEvent>;

/// What the room knows about one live producer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerInfo {
    pub id: Uuid,
    pub kind: MediaKind,
}

struct Room {
    producers: HashMap<Uuid, ProducerInfo>,
    members: HashMap<u64, PushSender>,
    created_at: Instant,
}

impl Room {
    fn new() -> Self {
        Self {
            producers: HashMap::new(),
            members: HashMap::new(),
            created_at: Instant::now(),
        }
    }

    fn reclaimable(&self) -> bool {
        self.members.is_empty() && self.producers.is_empty()
    }
}

/// In-memory registry of all active rooms
///
/// Constructed at server start and injected where needed; there is no
/// ambient global state, so multiple instances can coexist in tests.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Join a connection to a room, creating the room on first reference.
    ///
    /// Returns the producers already live, so late joiners know what to
    /// consume.
    pub async fn join(&self, room_id: &str, connection_id: u64, push: PushSender) -> Vec<ProducerInfo> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(room_id.to_string()).or_insert_with(|| {
            tracing::info!(room = room_id, "Room created");
            Room::new()
        });

        room.members.insert(connection_id, push);
        tracing::info!(
            room = room_id,
            connection = connection_id,
            members = room.members.len(),
            producers = room.producers.len(),
            "Member joined"
        );

        room.producers.values().cloned().collect()
    }

    /// Remove a connection from a room's membership
    pub async fn leave(&self, room_id: &str, connection_id: u64) {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get_mut(room_id) {
            if room.members.remove(&connection_id).is_some() {
                tracing::info!(
                    room = room_id,
                    connection = connection_id,
                    members = room.members.len(),
                    "Member left"
                );
            }
            if room.reclaimable() {
                let age = room.created_at.elapsed();
                rooms.remove(room_id);
                tracing::info!(room = room_id, age_secs = age.as_secs(), "Room reclaimed");
            }
        }
    }

    /// Register a producer in a room, creating the room on first reference
    pub async fn add_producer(&self, room_id: &str, info: ProducerInfo) {
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(room_id.to_string()).or_insert_with(|| {
            tracing::info!(room = room_id, "Room created");
            Room::new()
        });

        tracing::info!(
            room = room_id,
            producer = %info.id,
            kind = %info.kind,
            "Producer registered"
        );
        room.producers.insert(info.id, info);
    }

    /// Remove a producer from its room's set
    pub async fn remove_producer(&self, room_id: &str, producer_id: Uuid) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(room_id) else {
            return false;
        };

        let removed = room.producers.remove(&producer_id).is_some();
        if removed {
            tracing::info!(room = room_id, producer = %producer_id, "Producer removed");
        }
        if room.reclaimable() {
            rooms.remove(room_id);
            tracing::info!(room = room_id, "Room reclaimed");
        }
        removed
    }

    /// What's already live in a room; answers the late-joiner question
    pub async fn list_producers(&self, room_id: &str) -> Result<Vec<ProducerInfo>, RelayError> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room_id)
            .map(|room| room.producers.values().cloned().collect())
            .ok_or_else(|| RelayError::RoomNotFound(room_id.to_string()))
    }

    /// Push an event to every member of a room except `exclude`.
    ///
    /// Push delivery is best effort: a member whose channel is gone is
    /// simply skipped (its connection is tearing down anyway).
    pub async fn broadcast_to_others(&self, room_id: &str, exclude: u64, event: PushEvent) {
        let senders: Vec<(u64, PushSender)> = {
            let rooms = self.rooms.read().await;
            match rooms.get(room_id) {
                Some(room) => room
                    .members
                    .iter()
                    .filter(|(id, _)| **id != exclude)
                    .map(|(id, tx)| (*id, tx.clone()))
                    .collect(),
                None => return,
            }
        };

        for (member, tx) in senders {
            if tx.send(event.clone()).is_err() {
                tracing::debug!(room = room_id, connection = member, "Push skipped, member gone");
            }
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn member_count(&self, room_id: &str) -> usize {
        self.rooms
            .read()
            .await
            .get(room_id)
            .map(|r| r.members.len())
            .unwrap_or(0)
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(kind: MediaKind) -> ProducerInfo {
        ProducerInfo {
            id: Uuid::new_v4(),
            kind,
        }
    }

    #[tokio::test]
    async fn test_produce_then_close_round_trips() {
        let registry = RoomRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.join("abc123", 1, tx).await;

        let before = registry.list_producers("abc123").await.unwrap();

        let video = info(MediaKind::Video);
        registry.add_producer("abc123", video.clone()).await;
        assert_eq!(registry.list_producers("abc123").await.unwrap().len(), 1);

        registry.remove_producer("abc123", video.id).await;
        let after = registry.list_producers("abc123").await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_late_joiner_sees_live_producers() {
        let registry = RoomRegistry::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        registry.join("abc123", 1, tx1).await;
        registry.add_producer("abc123", info(MediaKind::Audio)).await;
        registry.add_producer("abc123", info(MediaKind::Video)).await;

        let (tx2, _rx2) = mpsc::unbounded_channel();
        let existing = registry.join("abc123", 2, tx2).await;
        assert_eq!(existing.len(), 2);
    }

    #[tokio::test]
    async fn test_broadcast_excludes_origin() {
        let registry = RoomRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.join("abc123", 1, tx1).await;
        registry.join("abc123", 2, tx2).await;

        let produced = info(MediaKind::Video);
        registry.add_producer("abc123", produced.clone()).await;
        registry
            .broadcast_to_others("abc123", 1, PushEvent::NewProducer(produced))
            .await;

        assert!(rx1.try_recv().is_err());
        assert!(matches!(rx2.try_recv(), Ok(PushEvent::NewProducer(_))));
    }

    #[tokio::test]
    async fn test_room_reclaimed_when_empty() {
        let registry = RoomRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.join("abc123", 1, tx).await;
        assert_eq!(registry.room_count().await, 1);

        registry.leave("abc123", 1).await;
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_room_with_producers_outlives_members() {
        let registry = RoomRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.join("abc123", 1, tx).await;
        registry.add_producer("abc123", info(MediaKind::Audio)).await;

        registry.leave("abc123", 1).await;
        assert_eq!(registry.room_count().await, 1);

        let unknown = registry.list_producers("missing").await;
        assert!(matches!(unknown, Err(RelayError::RoomNotFound(_))));
    }
}
