//! Room registry
//!
//! Creates rooms on first join (loading any persisted document), routes
//! register/unregister, and drops rooms once their last participant leaves.
//! Rooms are fully isolated from each other.

use std::sync::Arc;

use cowrite_core::{Result, RoomId};
use cowrite_protocol::Message;
use cowrite_storage::Storage;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::room::Room;

/// Registry of active rooms
pub struct Hub {
    rooms: DashMap<String, Arc<Mutex<Room>>>,
    storage: Option<Arc<dyn Storage>>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            storage: None,
        }
    }

    /// Set the storage backend for room document persistence
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Mint a server-assigned client identity
    pub fn assign_client_id(&self) -> String {
        let uuid = Uuid::new_v4().simple().to_string();
        format!("user-{}", &uuid[..8])
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Join a client into a room, creating and loading it if needed.
    ///
    /// The returned handle is what the connection task drives.
    pub async fn register(
        &self,
        room_id: &str,
        client_id: &str,
        sender: mpsc::Sender<Message>,
    ) -> Result<Arc<Mutex<Room>>> {
        let id = RoomId::new(room_id)?;

        let room = match self.rooms.get(id.as_str()) {
            Some(existing) => existing.value().clone(),
            None => {
                let content = self.load_document(&id).await;
                self.rooms
                    .entry(id.as_str().to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(Room::with_document(id, content))))
                    .value()
                    .clone()
            }
        };

        room.lock().join(client_id, sender);
        Ok(room)
    }

    /// Remove a client; the room is dropped once empty
    pub fn unregister(&self, room_id: &str, client_id: &str) {
        let Some(room) = self.rooms.get(room_id).map(|r| r.value().clone()) else {
            return;
        };

        let empty = {
            let mut room = room.lock();
            room.leave(client_id);
            room.is_empty()
        };

        if empty {
            self.rooms.remove(room_id);
            info!(room = %room_id, "Dropped empty room");
        }
    }

    /// Persist a room's document if it changed since the last call
    pub async fn persist(&self, room_id: &str) {
        let Some(storage) = &self.storage else { return };
        let Some(room) = self.rooms.get(room_id).map(|r| r.value().clone()) else {
            return;
        };

        let snapshot = {
            let mut room = room.lock();
            room.take_dirty()
                .then(|| (room.id().clone(), room.content().to_string()))
        };

        if let Some((id, content)) = snapshot {
            if let Err(e) = storage.save(&id, &content).await {
                warn!(room = %id, error = %e, "Failed to persist room document");
            }
        }
    }

    async fn load_document(&self, id: &RoomId) -> String {
        let Some(storage) = &self.storage else {
            return String::new();
        };
        match storage.load(id).await {
            Ok(Some(content)) => {
                info!(room = %id, chars = content.chars().count(), "Loaded persisted room document");
                content
            }
            Ok(None) => {
                info!(room = %id, "No existing document, starting fresh");
                String::new()
            }
            Err(e) => {
                warn!(room = %id, error = %e, "Failed to load room document, starting fresh");
                String::new()
            }
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}
