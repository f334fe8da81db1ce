//! Positional edit operations

use serde::{Deserialize, Serialize};

/// The two kinds of positional edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Insert,
    Delete,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Insert => "insert",
            OpKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single positional insert or delete.
///
/// The deleted text is carried alongside the position so the operation can be
/// inverted and so applications can be verified. `position` is a character
/// offset, not a byte offset. Operations are immutable once created; the
/// `base_version` records the document version the edit was computed against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OpKind,
    pub position: usize,
    pub text: String,
    pub client_id: String,
    pub base_version: u64,
}

impl Operation {
    pub fn insert(
        position: usize,
        text: impl Into<String>,
        client_id: impl Into<String>,
        base_version: u64,
    ) -> Self {
        Self {
            kind: OpKind::Insert,
            position,
            text: text.into(),
            client_id: client_id.into(),
            base_version,
        }
    }

    pub fn delete(
        position: usize,
        text: impl Into<String>,
        client_id: impl Into<String>,
        base_version: u64,
    ) -> Self {
        Self {
            kind: OpKind::Delete,
            position,
            text: text.into(),
            client_id: client_id.into(),
            base_version,
        }
    }

    /// Number of characters inserted or removed
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// The inverse operation, undoing this one against the post-state
    pub fn invert(&self) -> Operation {
        let kind = match self.kind {
            OpKind::Insert => OpKind::Delete,
            OpKind::Delete => OpKind::Insert,
        };
        Operation {
            kind,
            position: self.position,
            text: self.text.clone(),
            client_id: self.client_id.clone(),
            base_version: self.base_version,
        }
    }
}
