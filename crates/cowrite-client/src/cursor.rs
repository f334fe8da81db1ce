//! Remote cursor tracking
//!
//! One cursor per remote participant, keyed by user ID. The registry stores
//! the participant's *self-reported* document offset; offsets are never
//! shifted arithmetically when operations land, because every participant
//! keeps re-reporting their own caret. The registry's job is re-projecting a
//! stored offset onto fresh screen coordinates whenever the surrounding text
//! moves.

use std::collections::HashMap;

use crate::surface::EditorSurface;

/// Rendering seam for remote cursors.
///
/// The renderer owns the visual representation; the registry drives it
/// through opaque handles. A handle can become detached when the surface
/// destructively replaces its content tree; `attach` re-parents it.
pub trait CursorRenderer {
    type Handle;

    fn create(&mut self, user_id: &str) -> Self::Handle;

    /// Place the cursor at screen coordinates
    fn place(&mut self, handle: &mut Self::Handle, x: f32, y: f32);

    /// Hide the cursor (offset currently unmappable)
    fn hide(&mut self, handle: &mut Self::Handle);

    fn remove(&mut self, handle: Self::Handle);

    fn is_attached(&self, handle: &Self::Handle) -> bool;

    fn attach(&mut self, handle: &mut Self::Handle);
}

struct RemoteCursor<H> {
    position: usize,
    handle: H,
}

/// Tracks one cursor per remote participant
pub struct RemoteCursorRegistry<R: CursorRenderer> {
    renderer: R,
    cursors: HashMap<String, RemoteCursor<R::Handle>>,
}

impl<R: CursorRenderer> RemoteCursorRegistry<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            cursors: HashMap::new(),
        }
    }

    /// Create-or-update a participant's cursor from their self-reported offset
    pub fn report(&mut self, user_id: &str, position: usize, surface: &impl EditorSurface) {
        let Self { renderer, cursors } = self;
        let cursor = cursors.entry(user_id.to_string()).or_insert_with(|| RemoteCursor {
            position,
            handle: renderer.create(user_id),
        });
        cursor.position = position;
        project(renderer, cursor, surface);
    }

    /// Drop a participant's cursor (leave notification, teardown)
    pub fn remove(&mut self, user_id: &str) {
        if let Some(cursor) = self.cursors.remove(user_id) {
            self.renderer.remove(cursor.handle);
        }
    }

    /// Re-project every cursor after the document shifted.
    ///
    /// Stored offsets stay untouched; only the screen placement is
    /// recomputed, clamped into the current document bounds.
    pub fn reposition_all(&mut self, surface: &impl EditorSurface) {
        let Self { renderer, cursors } = self;
        for cursor in cursors.values_mut() {
            project(renderer, cursor, surface);
        }
    }

    /// Re-parent handles detached by a destructive content replace
    pub fn reattach_detached(&mut self) {
        let Self { renderer, cursors } = self;
        for cursor in cursors.values_mut() {
            if !renderer.is_attached(&cursor.handle) {
                renderer.attach(&mut cursor.handle);
            }
        }
    }

    /// Drop every cursor (session teardown)
    pub fn clear(&mut self) {
        for (_, cursor) in self.cursors.drain() {
            self.renderer.remove(cursor.handle);
        }
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.cursors.contains_key(user_id)
    }

    /// The stored (self-reported) offset for a participant
    pub fn position_of(&self, user_id: &str) -> Option<usize> {
        self.cursors.get(user_id).map(|c| c.position)
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }
}

fn project<R: CursorRenderer>(
    renderer: &mut R,
    cursor: &mut RemoteCursor<R::Handle>,
    surface: &impl EditorSurface,
) {
    // The stored offset may predate a shrink; it must never index past the end.
    let clamped = cursor.position.min(surface.char_len());
    match surface.coords_at(clamped) {
        Some((x, y)) => renderer.place(&mut cursor.handle, x, y),
        None => renderer.hide(&mut cursor.handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::BufferSurface;

    /// Test renderer recording every placement
    #[derive(Default)]
    struct RecordingRenderer {
        removed: Vec<String>,
    }

    #[derive(Debug, PartialEq)]
    struct Mark {
        user: String,
        at: Option<(f32, f32)>,
        attached: bool,
    }

    impl CursorRenderer for RecordingRenderer {
        type Handle = Mark;

        fn create(&mut self, user_id: &str) -> Mark {
            Mark {
                user: user_id.to_string(),
                at: None,
                attached: true,
            }
        }

        fn place(&mut self, handle: &mut Mark, x: f32, y: f32) {
            handle.at = Some((x, y));
        }

        fn hide(&mut self, handle: &mut Mark) {
            handle.at = None;
        }

        fn remove(&mut self, handle: Mark) {
            self.removed.push(handle.user);
        }

        fn is_attached(&self, handle: &Mark) -> bool {
            handle.attached
        }

        fn attach(&mut self, handle: &mut Mark) {
            handle.attached = true;
        }
    }

    #[test]
    fn test_report_creates_then_updates() {
        let surface = BufferSurface::with_content("hello");
        let mut registry = RemoteCursorRegistry::new(RecordingRenderer::default());

        registry.report("u1", 2, &surface);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.position_of("u1"), Some(2));

        registry.report("u1", 4, &surface);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.position_of("u1"), Some(4));
    }

    #[test]
    fn test_reposition_keeps_offset_refreshes_coords() {
        let mut surface = BufferSurface::with_content("ab\ncd");
        let mut registry = RemoteCursorRegistry::new(RecordingRenderer::default());
        registry.report("u1", 4, &surface);

        // A newline lands before the cursor; the stored offset is unchanged
        // but its projection moves to the coordinates of offset 4 in the new
        // text.
        surface.apply_insert(0, "\n");
        registry.reposition_all(&surface);

        assert_eq!(registry.position_of("u1"), Some(4));
        let cursors = &registry.cursors;
        assert_eq!(cursors.get("u1").unwrap().handle.at, surface.coords_at(4));
    }

    #[test]
    fn test_reposition_clamps_after_shrink() {
        let mut surface = BufferSurface::with_content("abcdef");
        let mut registry = RemoteCursorRegistry::new(RecordingRenderer::default());
        registry.report("u1", 6, &surface);

        surface.apply_delete(2, 4);
        registry.reposition_all(&surface);

        // Offset stays as reported, projection clamps to the new end
        assert_eq!(registry.position_of("u1"), Some(6));
        assert_eq!(
            registry.cursors.get("u1").unwrap().handle.at,
            surface.coords_at(2)
        );
    }

    #[test]
    fn test_remove_releases_handle() {
        let surface = BufferSurface::with_content("x");
        let mut registry = RemoteCursorRegistry::new(RecordingRenderer::default());
        registry.report("u1", 0, &surface);
        registry.remove("u1");

        assert!(registry.is_empty());
        assert_eq!(registry.renderer().removed, vec!["u1"]);
    }

    #[test]
    fn test_clear_releases_all() {
        let surface = BufferSurface::with_content("x");
        let mut registry = RemoteCursorRegistry::new(RecordingRenderer::default());
        registry.report("u1", 0, &surface);
        registry.report("u2", 1, &surface);

        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.renderer().removed.len(), 2);
    }

    #[test]
    fn test_reattach_detached() {
        let surface = BufferSurface::with_content("x");
        let mut registry = RemoteCursorRegistry::new(RecordingRenderer::default());
        registry.report("u1", 0, &surface);

        registry.cursors.get_mut("u1").unwrap().handle.attached = false;
        registry.reattach_detached();
        assert!(registry.cursors.get("u1").unwrap().handle.attached);
    }
}
