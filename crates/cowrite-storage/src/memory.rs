//! In-memory storage backend

use crate::{Storage, StorageError};
use async_trait::async_trait;
use cowrite_core::RoomId;
use dashmap::DashMap;

/// In-memory storage backend
///
/// Fast, volatile storage suitable for development and testing.
/// Documents are lost when the process exits.
#[derive(Default)]
pub struct MemoryStorage {
    /// Room content keyed by room ID
    data: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save(&self, room: &RoomId, content: &str) -> Result<(), StorageError> {
        self.data.insert(room.as_str().to_string(), content.to_string());
        Ok(())
    }

    async fn load(&self, room: &RoomId) -> Result<Option<String>, StorageError> {
        Ok(self.data.get(room.as_str()).map(|e| e.value().clone()))
    }

    async fn delete(&self, room: &RoomId) -> Result<bool, StorageError> {
        Ok(self.data.remove(room.as_str()).is_some())
    }

    async fn list(&self) -> Result<Vec<RoomId>, StorageError> {
        let mut rooms = Vec::new();
        for entry in self.data.iter() {
            if let Ok(id) = RoomId::new(entry.key().clone()) {
                rooms.push(id);
            }
        }
        Ok(rooms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_load() {
        let storage = MemoryStorage::new();
        let room = RoomId::new("team:notes").unwrap();

        storage.save(&room, "hello world").await.unwrap();
        assert_eq!(
            storage.load(&room).await.unwrap(),
            Some("hello world".to_string())
        );
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let storage = MemoryStorage::new();
        let room = RoomId::new("nowhere").unwrap();
        assert_eq!(storage.load(&room).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let storage = MemoryStorage::new();
        let room = RoomId::new("r1").unwrap();

        storage.save(&room, "first").await.unwrap();
        storage.save(&room, "second").await.unwrap();
        assert_eq!(storage.load(&room).await.unwrap(), Some("second".into()));
    }

    #[tokio::test]
    async fn test_delete() {
        let storage = MemoryStorage::new();
        let room = RoomId::new("r2").unwrap();

        storage.save(&room, "data").await.unwrap();
        assert!(storage.delete(&room).await.unwrap());
        assert!(!storage.delete(&room).await.unwrap());
        assert_eq!(storage.load(&room).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list() {
        let storage = MemoryStorage::new();
        for name in ["a", "b", "c"] {
            storage
                .save(&RoomId::new(name).unwrap(), "x")
                .await
                .unwrap();
        }

        let mut rooms: Vec<String> = storage
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.as_str().to_string())
            .collect();
        rooms.sort();
        assert_eq!(rooms, vec!["a", "b", "c"]);
    }
}
