//! Flat-file storage backend
//!
//! One `doc-<room>.txt` file per room under a configurable directory.
//! Room IDs are validated on construction ([a-zA-Z0-9:_-]+), so the file
//! name can never escape the directory.

use crate::{Storage, StorageError};
use async_trait::async_trait;
use cowrite_core::RoomId;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Flat-file storage backend
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Create a file storage rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, room: &RoomId) -> PathBuf {
        self.dir.join(format!("doc-{}.txt", room.as_str()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn save(&self, room: &RoomId, content: &str) -> Result<(), StorageError> {
        let path = self.path_for(room);
        tokio::fs::write(&path, content).await?;
        debug!(room = %room, path = %path.display(), bytes = content.len(), "Saved room document");
        Ok(())
    }

    async fn load(&self, room: &RoomId) -> Result<Option<String>, StorageError> {
        let path = self.path_for(room);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, room: &RoomId) -> Result<bool, StorageError> {
        match tokio::fs::remove_file(self.path_for(room)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<RoomId>, StorageError> {
        let mut rooms = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name.strip_prefix("doc-").and_then(|n| n.strip_suffix(".txt")) else {
                continue;
            };
            if let Ok(id) = RoomId::new(stem) {
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
    async fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let room = RoomId::new("team:notes").unwrap();

        storage.save(&room, "persistent text").await.unwrap();
        assert_eq!(
            storage.load(&room).await.unwrap(),
            Some("persistent text".to_string())
        );

        // File layout is one doc-<room>.txt per room
        assert!(dir.path().join("doc-team:notes.txt").exists());
    }

    #[tokio::test]
    async fn test_load_missing_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let room = RoomId::new("fresh").unwrap();

        assert_eq!(storage.load(&room).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let room = RoomId::new("gone").unwrap();

        storage.save(&room, "x").await.unwrap();
        assert!(storage.delete(&room).await.unwrap());
        assert!(!storage.delete(&room).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_skips_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();

        storage
            .save(&RoomId::new("alpha").unwrap(), "a")
            .await
            .unwrap();
        storage
            .save(&RoomId::new("beta").unwrap(), "b")
            .await
            .unwrap();
        std::fs::write(dir.path().join("notes.md"), "not a doc").unwrap();

        let mut rooms: Vec<String> = storage
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.as_str().to_string())
            .collect();
        rooms.sort();
        assert_eq!(rooms, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let room = RoomId::new("durable").unwrap();

        {
            let storage = FileStorage::new(dir.path()).unwrap();
            storage.save(&room, "still here").await.unwrap();
        }

        let reopened = FileStorage::new(dir.path()).unwrap();
        assert_eq!(
            reopened.load(&room).await.unwrap(),
            Some("still here".to_string())
        );
    }
}
