//! Shared document state

use crate::error::{Error, Result};
use crate::operation::{OpKind, Operation};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Room identifier - UTF-8 string, max 512 bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(String);

impl RoomId {
    /// Create a new room ID, validating the format
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(Error::InvalidRoomId("Room ID cannot be empty".into()));
        }

        if id.len() > 512 {
            return Err(Error::InvalidRoomId("Room ID exceeds 512 bytes".into()));
        }

        // Validate pattern: [a-zA-Z0-9:_-]+
        if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == ':' || c == '_' || c == '-') {
            return Err(Error::InvalidRoomId(
                "Room ID must match pattern [a-zA-Z0-9:_-]+".into(),
            ));
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The shared text document plus its server-assigned version.
///
/// The document is mutated only through `apply` and `force_sync`, so every
/// content change can be attributed to an operation or a full resync. The
/// version only ever increases; `force_sync` is the single exception, used
/// when adopting an authoritative snapshot after (re)connect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    content: String,
    version: u64,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(content: impl Into<String>, version: u64) -> Self {
        Self {
            content: content.into(),
            version,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Document length in characters (positions index into this range)
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Apply a positional operation to the content.
    ///
    /// Out-of-range operations are rejected without any partial mutation;
    /// applying them would corrupt the offsets of every subsequent operation.
    /// The version is not touched here - versioned batches advance it through
    /// `advance_to` once the whole batch is accounted for.
    pub fn apply(&mut self, op: &Operation) -> Result<()> {
        let len = self.char_len();

        match op.kind {
            OpKind::Insert => {
                if op.position > len {
                    return Err(Error::OutOfRange {
                        kind: "insert",
                        position: op.position,
                        len,
                    });
                }
                let at = byte_index(&self.content, op.position);
                self.content.insert_str(at, &op.text);
            }
            OpKind::Delete => {
                let span = op.char_len();
                if op.position + span > len {
                    return Err(Error::OutOfRange {
                        kind: "delete",
                        position: op.position,
                        len,
                    });
                }
                let start = byte_index(&self.content, op.position);
                let end = byte_index(&self.content, op.position + span);
                if self.content[start..end] != op.text {
                    warn!(
                        position = op.position,
                        expected = %op.text,
                        found = %&self.content[start..end],
                        "Deleted text does not match carried text, deleting by length"
                    );
                }
                self.content.replace_range(start..end, "");
            }
        }

        Ok(())
    }

    /// Advance the version after applying a server-assigned batch.
    ///
    /// Duplicate deliveries show up as a stale version and must be skipped by
    /// the caller before re-applying any content.
    pub fn advance_to(&mut self, version: u64) -> Result<()> {
        if version <= self.version {
            return Err(Error::StaleVersion {
                incoming: version,
                current: self.version,
            });
        }
        self.version = version;
        Ok(())
    }

    /// Adopt an authoritative snapshot, replacing content and version.
    ///
    /// Returns true if the content actually changed.
    pub fn force_sync(&mut self, content: &str, version: u64) -> bool {
        self.version = version;
        if self.content != content {
            self.content = content.to_string();
            true
        } else {
            false
        }
    }
}

/// Byte offset of the given character position.
///
/// Callers must have validated `char_pos <= char_len` first.
fn byte_index(s: &str, char_pos: usize) -> usize {
    s.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(s.len()))
        .nth(char_pos)
        .unwrap_or(s.len())
}
