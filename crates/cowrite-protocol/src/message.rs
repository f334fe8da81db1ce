//! Sync protocol message types
//!
//! All traffic is JSON objects over WebSocket text frames, tagged by a
//! `type` field. Field names (`user_id`, `clientID`) are part of the wire
//! contract and must not change.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{ProtocolError, ProtocolResult};

/// Maximum message size (1MB)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// The `user_id` the sequencer stamps on its own messages
pub const SERVER_ID: &str = "server";

/// One sequenced entry of the server's change log.
///
/// `changes` carries a codec-encoded operation (see [`crate::codec`]);
/// `version` is the server-assigned sequence number, except inside a push
/// where it still holds the client's base version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedUpdate {
    pub version: u64,
    pub changes: String,
    #[serde(rename = "clientID")]
    pub client_id: String,
}

/// All messages exchanged between client and sequencer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// Server -> client, once per connection: the assigned client ID
    Join { content: String, user_id: String },

    /// Server -> client: initial snapshot of content and version
    Version {
        version: u64,
        content: String,
        user_id: String,
    },

    /// Client -> server: the pending batch, based on `version`
    Push {
        updates: Vec<VersionedUpdate>,
        version: u64,
        user_id: String,
    },

    /// Client -> server: request updates newer than `version`
    Pull { version: u64, user_id: String },

    /// Server -> client: pull response or broadcast of sequenced updates
    Updates {
        version: u64,
        updates: Vec<VersionedUpdate>,
        user_id: String,
    },

    /// Legacy per-keystroke insert (non-versioned protocol variant)
    Insert {
        content: String,
        position: usize,
        user_id: String,
        timestamp: u64,
    },

    /// Legacy per-keystroke delete (non-versioned protocol variant)
    Delete {
        content: String,
        position: usize,
        user_id: String,
        timestamp: u64,
    },

    /// Presence: a participant's self-reported caret offset
    Cursor { position: usize, user_id: String },

    /// Server -> client: a participant left the room
    Leave { user_id: String },

    /// Presence: a participant renamed themselves
    Name { content: String, user_id: String },
}

impl Message {
    pub fn join(assigned_id: impl Into<String>) -> Self {
        Message::Join {
            content: assigned_id.into(),
            user_id: SERVER_ID.into(),
        }
    }

    pub fn version(version: u64, content: impl Into<String>) -> Self {
        Message::Version {
            version,
            content: content.into(),
            user_id: SERVER_ID.into(),
        }
    }

    pub fn push(updates: Vec<VersionedUpdate>, base_version: u64, user_id: impl Into<String>) -> Self {
        Message::Push {
            updates,
            version: base_version,
            user_id: user_id.into(),
        }
    }

    pub fn pull(version: u64, user_id: impl Into<String>) -> Self {
        Message::Pull {
            version,
            user_id: user_id.into(),
        }
    }

    pub fn updates(version: u64, updates: Vec<VersionedUpdate>) -> Self {
        Message::Updates {
            version,
            updates,
            user_id: SERVER_ID.into(),
        }
    }

    pub fn insert(content: impl Into<String>, position: usize, user_id: impl Into<String>) -> Self {
        Message::Insert {
            content: content.into(),
            position,
            user_id: user_id.into(),
            timestamp: now_millis(),
        }
    }

    pub fn delete(content: impl Into<String>, position: usize, user_id: impl Into<String>) -> Self {
        Message::Delete {
            content: content.into(),
            position,
            user_id: user_id.into(),
            timestamp: now_millis(),
        }
    }

    pub fn cursor(position: usize, user_id: impl Into<String>) -> Self {
        Message::Cursor {
            position,
            user_id: user_id.into(),
        }
    }

    pub fn leave(user_id: impl Into<String>) -> Self {
        Message::Leave {
            user_id: user_id.into(),
        }
    }

    pub fn name(alias: impl Into<String>, user_id: impl Into<String>) -> Self {
        Message::Name {
            content: alias.into(),
            user_id: user_id.into(),
        }
    }

    /// The sender recorded in the message
    pub fn user_id(&self) -> &str {
        match self {
            Message::Join { user_id, .. }
            | Message::Version { user_id, .. }
            | Message::Push { user_id, .. }
            | Message::Pull { user_id, .. }
            | Message::Updates { user_id, .. }
            | Message::Insert { user_id, .. }
            | Message::Delete { user_id, .. }
            | Message::Cursor { user_id, .. }
            | Message::Leave { user_id, .. }
            | Message::Name { user_id, .. } => user_id,
        }
    }

    /// Serialize to a wire frame
    pub fn encode(&self) -> ProtocolResult<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
    }

    /// Parse a wire frame
    pub fn decode(frame: &str) -> ProtocolResult<Message> {
        if frame.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: frame.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        serde_json::from_str(frame).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
    }
}

/// Milliseconds since the Unix epoch, for legacy message timestamps
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_roundtrip() {
        let msg = Message::join("user-1a2b");
        let frame = msg.encode().unwrap();
        assert!(frame.contains(r#""type":"join""#));
        assert_eq!(Message::decode(&frame).unwrap(), msg);
    }

    #[test]
    fn test_version_roundtrip() {
        let msg = Message::version(7, "shared text");
        let frame = msg.encode().unwrap();
        assert!(frame.contains(r#""type":"version""#));
        assert!(frame.contains(r#""version":7"#));
        assert_eq!(Message::decode(&frame).unwrap(), msg);
    }

    #[test]
    fn test_push_wire_field_names() {
        let update = VersionedUpdate {
            version: 3,
            changes: r#"{"kind":"insert","position":0,"text":"x"}"#.into(),
            client_id: "c1".into(),
        };
        let frame = Message::push(vec![update], 3, "c1").encode().unwrap();

        // clientID casing is part of the protocol
        assert!(frame.contains(r#""clientID":"c1""#));
        assert!(frame.contains(r#""user_id":"c1""#));
    }

    #[test]
    fn test_pull_roundtrip() {
        let msg = Message::pull(12, "c2");
        let decoded = Message::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_updates_roundtrip() {
        let updates = vec![
            VersionedUpdate {
                version: 1,
                changes: "a".into(),
                client_id: "c1".into(),
            },
            VersionedUpdate {
                version: 2,
                changes: "b".into(),
                client_id: "c2".into(),
            },
        ];
        let msg = Message::updates(2, updates);
        assert_eq!(Message::decode(&msg.encode().unwrap()).unwrap(), msg);
    }

    #[test]
    fn test_legacy_insert_shape() {
        let frame = r#"{"type":"insert","content":"Hi","position":4,"user_id":"c9","timestamp":1700000000000}"#;
        match Message::decode(frame).unwrap() {
            Message::Insert {
                content,
                position,
                user_id,
                timestamp,
            } => {
                assert_eq!(content, "Hi");
                assert_eq!(position, 4);
                assert_eq!(user_id, "c9");
                assert_eq!(timestamp, 1_700_000_000_000);
            }
            other => panic!("expected insert, got {:?}", other),
        }
    }

    #[test]
    fn test_cursor_and_leave_roundtrip() {
        let cursor = Message::cursor(9, "c1");
        assert_eq!(Message::decode(&cursor.encode().unwrap()).unwrap(), cursor);

        let leave = Message::leave("c1");
        assert_eq!(Message::decode(&leave.encode().unwrap()).unwrap(), leave);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Message::decode("not json").is_err());
        assert!(Message::decode(r#"{"type":"warp","user_id":"c1"}"#).is_err());
        assert!(Message::decode(r#"{"position":1}"#).is_err());
    }

    #[test]
    fn test_decode_rejects_oversized_frame() {
        let huge = format!(
            r#"{{"type":"cursor","position":1,"user_id":"{}"}}"#,
            "x".repeat(MAX_MESSAGE_SIZE)
        );
        assert!(matches!(
            Message::decode(&huge),
            Err(ProtocolError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_user_id_accessor() {
        assert_eq!(Message::cursor(0, "c3").user_id(), "c3");
        assert_eq!(Message::version(0, "").user_id(), SERVER_ID);
    }
}
