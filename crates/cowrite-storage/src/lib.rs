//! CoWrite Storage Backends
//!
//! Provides pluggable persistence for room documents:
//! - Memory (default): Fast, volatile storage
//! - File: One flat text file per room

pub mod file;
pub mod memory;

use async_trait::async_trait;
use cowrite_core::RoomId;

/// Storage backend trait
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist a room's document content
    async fn save(&self, room: &RoomId, content: &str) -> Result<(), StorageError>;

    /// Load a room's document content, `None` if the room has none yet
    async fn load(&self, room: &RoomId) -> Result<Option<String>, StorageError>;

    /// Delete a room's stored document
    async fn delete(&self, room: &RoomId) -> Result<bool, StorageError>;

    /// List all rooms with stored documents
    async fn list(&self) -> Result<Vec<RoomId>, StorageError>;
}

/// Storage error types
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Room not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Invalid room ID: {0}")]
    InvalidRoomId(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}

pub use file::FileStorage;
pub use memory::MemoryStorage;
