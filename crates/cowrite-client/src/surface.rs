//! Editing surface seam
//!
//! The visual editor is an external collaborator; the engine only ever talks
//! to it through [`EditorSurface`]. Remote operations reach the surface
//! through the engine's apply routines, never the other way around, so every
//! content change can be attributed and versioned.

/// One contiguous edit reported by a structured editing surface.
///
/// Offsets are character offsets: `from_old..to_old` is the replaced span in
/// the pre-edit text, `from_new` its start in the post-edit text, `inserted`
/// the replacement. Surfaces report multiple ranges in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRange {
    pub from_old: usize,
    pub to_old: usize,
    pub from_new: usize,
    pub inserted: String,
}

impl ChangeRange {
    pub fn insertion(position: usize, text: impl Into<String>) -> Self {
        Self {
            from_old: position,
            to_old: position,
            from_new: position,
            inserted: text.into(),
        }
    }

    pub fn deletion(position: usize, span: usize) -> Self {
        Self {
            from_old: position,
            to_old: position + span,
            from_new: position,
            inserted: String::new(),
        }
    }
}

/// Contract of the embedded text editor.
///
/// Offsets are character offsets into the surface's current text.
/// `coords_at` maps an offset to screen coordinates and may fail for offsets
/// outside the rendered viewport.
pub trait EditorSurface {
    fn content(&self) -> String;

    /// Replace the whole text (authoritative snapshot adoption)
    fn set_content(&mut self, text: &str);

    /// Apply a remote insertion
    fn apply_insert(&mut self, position: usize, text: &str);

    /// Apply a remote deletion of `span` characters
    fn apply_delete(&mut self, position: usize, span: usize);

    /// The local participant's caret offset
    fn caret(&self) -> usize;

    /// Offset -> screen coordinate mapping; `None` when unresolvable
    fn coords_at(&self, offset: usize) -> Option<(f32, f32)>;

    fn char_len(&self) -> usize {
        self.content().chars().count()
    }
}

/// A headless editing surface: a plain text buffer with a caret.
///
/// Used by the terminal client and by tests. Coordinates are
/// (column, line) pairs; every offset inside the buffer is "visible".
/// The caret tracks remote edits the way a real editor does: text inserted
/// before it shifts it right, text deleted before it shifts it left.
#[derive(Debug, Default, Clone)]
pub struct BufferSurface {
    content: String,
    caret: usize,
}

impl BufferSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            caret: 0,
        }
    }

    pub fn set_caret(&mut self, position: usize) {
        self.caret = position.min(self.char_len());
    }

    /// Local insertion at the caret-controlled position
    pub fn insert_local(&mut self, position: usize, text: &str) {
        let position = position.min(self.char_len());
        let at = byte_index(&self.content, position);
        self.content.insert_str(at, text);
        self.caret = position + text.chars().count();
    }

    /// Local deletion of `span` characters
    pub fn delete_local(&mut self, position: usize, span: usize) -> String {
        let len = self.char_len();
        let position = position.min(len);
        let span = span.min(len - position);
        let start = byte_index(&self.content, position);
        let end = byte_index(&self.content, position + span);
        let removed = self.content[start..end].to_string();
        self.content.replace_range(start..end, "");
        self.caret = position;
        removed
    }
}

impl EditorSurface for BufferSurface {
    fn content(&self) -> String {
        self.content.clone()
    }

    fn set_content(&mut self, text: &str) {
        self.content = text.to_string();
        self.caret = self.caret.min(self.char_len());
    }

    fn apply_insert(&mut self, position: usize, text: &str) {
        let position = position.min(self.char_len());
        let at = byte_index(&self.content, position);
        self.content.insert_str(at, text);
        if self.caret > position {
            self.caret += text.chars().count();
        }
    }

    fn apply_delete(&mut self, position: usize, span: usize) {
        let len = self.char_len();
        let position = position.min(len);
        let span = span.min(len - position);
        let start = byte_index(&self.content, position);
        let end = byte_index(&self.content, position + span);
        self.content.replace_range(start..end, "");
        if self.caret > position {
            self.caret = position.max(self.caret.saturating_sub(span));
        }
    }

    fn caret(&self) -> usize {
        self.caret
    }

    fn coords_at(&self, offset: usize) -> Option<(f32, f32)> {
        if offset > self.char_len() {
            return None;
        }
        let mut line = 0usize;
        let mut col = 0usize;
        for c in self.content.chars().take(offset) {
            if c == '\n' {
                line += 1;
                col = 0;
            } else {
                col += 1;
            }
        }
        Some((col as f32, line as f32))
    }
}

fn byte_index(s: &str, char_pos: usize) -> usize {
    s.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(s.len()))
        .nth(char_pos)
        .unwrap_or(s.len())
}
