//! Live connections and room membership

use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use super::events::ServerEvent;
use crate::core_access::DocumentId;

/// Process-unique connection id
pub type ConnectionId = u64;

/// Outbound queue of one connection; drained by its transport task
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

#[derive(Default)]
struct Registry {
    outboxes: HashMap<ConnectionId, Outbox>,
    rooms: HashMap<DocumentId, HashSet<ConnectionId>>,
    memberships: HashMap<ConnectionId, HashSet<DocumentId>>,
}

/// Connections and the rooms they are in
#[derive(Default)]
pub struct RoomRegistry {
    inner: RwLock<Registry>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: ConnectionId, outbox: Outbox) {
        self.inner.write().await.outboxes.insert(id, outbox);
    }

    /// Drop the connection and remove it from every room
    pub async fn unregister(&self, id: ConnectionId) {
        let mut registry = self.inner.write().await;
        registry.outboxes.remove(&id);

        let rooms = registry.memberships.remove(&id).unwrap_or_default();
        for room in rooms {
            if let Some(members) = registry.rooms.get_mut(&room) {
                members.remove(&id);
                if members.is_empty() {
                    registry.rooms.remove(&room);
                }
            }
        }
    }

    /// Idempotent
    pub async fn join(&self, id: ConnectionId, room: DocumentId) {
        let mut registry = self.inner.write().await;
        registry.rooms.entry(room).or_default().insert(id);
        registry.memberships.entry(id).or_default().insert(room);
    }

    /// Idempotent
    pub async fn leave(&self, id: ConnectionId, room: DocumentId) {
        let mut registry = self.inner.write().await;
        if let Some(members) = registry.rooms.get_mut(&room) {
            members.remove(&id);
            if members.is_empty() {
                registry.rooms.remove(&room);
            }
        }
        if let Some(rooms) = registry.memberships.get_mut(&id) {
            rooms.remove(&room);
        }
    }

    pub async fn members(&self, room: &DocumentId) -> HashSet<ConnectionId> {
        self.inner.read().await.rooms.get(room).cloned().unwrap_or_default()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.outboxes.len()
    }

    /// Queue `event` for one connection; false if it is gone
    pub async fn send_to(&self, id: ConnectionId, event: ServerEvent) -> bool {
        let registry = self.inner.read().await;
        match registry.outboxes.get(&id) {
            Some(outbox) => outbox.send(event).is_ok(),
            None => false,
        }
    }

    /// Queue `event` for every member of `room` except `except`; returns deliveries
    pub async fn broadcast(
        &self,
        room: &DocumentId,
        except: Option<ConnectionId>,
        event: &ServerEvent,
    ) -> usize {
        let registry = self.inner.read().await;
        let Some(members) = registry.rooms.get(room) else {
            return 0;
        };

        let mut delivered = 0;
        for member in members.iter().filter(|m| Some(**m) != except) {
            match registry.outboxes.get(member) {
                Some(outbox) if outbox.send(event.clone()).is_ok() => delivered += 1,
                _ => debug!(connection = *member, "Skipping closed connection"),
            }
        }
        delivered
    }
}
