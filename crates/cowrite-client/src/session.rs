//! The reconciliation session
//!
//! A sans-I/O state machine: every external event (socket frame, timer
//! expiry, local edit notification) is a method call that runs to completion
//! and returns the wire messages to transmit. The async connector owns the
//! socket and timers and drives this type; nothing here blocks or races.
//!
//! State machine per connection:
//!
//! ```text
//! Disconnected -> AwaitingVersion -> Synced <-> (Pushing | Pulling)
//!       ^                                          |
//!       +------------------------------------------+
//! ```

use std::collections::HashMap;

use cowrite_core::{diff, Document, OpKind, Operation, UpdateLog};
use cowrite_protocol::{codec, Message, VersionedUpdate};
use tracing::{debug, info, warn};

use crate::cursor::{CursorRenderer, RemoteCursorRegistry};
use crate::surface::{ChangeRange, EditorSurface};

/// Who we are in the room
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionIdentity {
    /// Server-assigned, adopted from the join message; empty until then
    pub client_id: String,
    pub display_name: String,
    pub room_id: String,
}

/// Observable connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    AwaitingVersion,
    Synced,
    Pushing,
    Pulling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Disconnected,
    AwaitingVersion,
    Ready,
}

/// The single outstanding pull, if any.
///
/// `covers_push` records whether a push was already in flight when this pull
/// was issued; the transport is ordered, so such a pull's response proves
/// whether that push reached the sequencer's log.
#[derive(Debug, Clone, Copy)]
struct PullProbe {
    since: u64,
    covers_push: bool,
}

/// Client-side reconciliation controller.
///
/// Owns the engine's [`Document`] exclusively; the editing surface receives
/// remote mutations only through this type, so every content change is
/// attributable to an operation or a snapshot adoption.
pub struct Session<S: EditorSurface, R: CursorRenderer> {
    identity: SessionIdentity,
    phase: Phase,
    doc: Document,
    log: UpdateLog,
    pending_pull: Option<PullProbe>,
    peer_names: HashMap<String, String>,
    surface: S,
    cursors: RemoteCursorRegistry<R>,
    dirty: bool,
}

impl<S: EditorSurface, R: CursorRenderer> Session<S, R> {
    pub fn new(room_id: impl Into<String>, display_name: Option<String>, surface: S, renderer: R) -> Self {
        let room_id = room_id.into();
        Self {
            identity: SessionIdentity {
                client_id: String::new(),
                display_name: display_name.unwrap_or_default(),
                room_id,
            },
            phase: Phase::Disconnected,
            doc: Document::new(),
            log: UpdateLog::new(),
            pending_pull: None,
            peer_names: HashMap::new(),
            surface,
            cursors: RemoteCursorRegistry::new(renderer),
            dirty: false,
        }
    }

    /// The transport opened; wait for the server's join/version handshake
    pub fn connect(&mut self) {
        self.phase = Phase::AwaitingVersion;
    }

    pub fn state(&self) -> SessionState {
        match self.phase {
            Phase::Disconnected => SessionState::Disconnected,
            Phase::AwaitingVersion => SessionState::AwaitingVersion,
            Phase::Ready => {
                if self.log.is_in_flight() {
                    SessionState::Pushing
                } else if self.pending_pull.is_some() {
                    SessionState::Pulling
                } else {
                    SessionState::Synced
                }
            }
        }
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn client_id(&self) -> &str {
        &self.identity.client_id
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn cursors(&self) -> &RemoteCursorRegistry<R> {
        &self.cursors
    }

    pub fn peer_name(&self, user_id: &str) -> Option<&str> {
        self.peer_names.get(user_id).map(String::as_str)
    }

    /// Whether the driver should arm the push debounce timer
    pub fn wants_push(&self) -> bool {
        matches!(self.phase, Phase::Ready) && self.log.can_push()
    }

    /// Whether state changed since the last call (driver notification hook)
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    // ---- incoming ----

    /// Decode and dispatch one raw frame.
    ///
    /// Malformed frames are dropped with a warning; the session survives and
    /// the next pull re-requests state.
    pub fn handle_frame(&mut self, frame: &str) -> Vec<Message> {
        match Message::decode(frame) {
            Ok(msg) => self.handle_message(msg),
            Err(e) => {
                warn!(error = %e, "Dropping undecodable frame");
                Vec::new()
            }
        }
    }

    pub fn handle_message(&mut self, msg: Message) -> Vec<Message> {
        if matches!(self.phase, Phase::Disconnected) {
            // Late delivery after teardown; nothing may mutate anymore
            return Vec::new();
        }

        match msg {
            Message::Join { content, .. } => self.handle_join(content),
            Message::Version { version, content, .. } => self.handle_version(version, &content),
            Message::Updates { version, updates, .. } => self.handle_updates(version, &updates),
            Message::Insert {
                content,
                position,
                user_id,
                ..
            } => self.handle_legacy(OpKind::Insert, content, position, user_id),
            Message::Delete {
                content,
                position,
                user_id,
                ..
            } => self.handle_legacy(OpKind::Delete, content, position, user_id),
            Message::Cursor { position, user_id } => self.handle_cursor(position, user_id),
            Message::Leave { user_id } => self.handle_leave(user_id),
            Message::Name { content, user_id } => self.handle_name(content, user_id),
            Message::Push { .. } | Message::Pull { .. } => {
                debug!("Ignoring client-bound message echoed to client");
                Vec::new()
            }
        }
    }

    fn handle_join(&mut self, assigned: String) -> Vec<Message> {
        if self.identity.client_id.is_empty() {
            info!(client = %assigned, room = %self.identity.room_id, "Adopted server-assigned identity");
            if self.identity.display_name.is_empty() {
                self.identity.display_name = assigned.clone();
            }
            self.identity.client_id = assigned;
        } else {
            debug!(user = %assigned, "Ignoring join for already-identified session");
        }
        Vec::new()
    }

    fn handle_version(&mut self, version: u64, content: &str) -> Vec<Message> {
        // Force-set only when the snapshot actually differs
        if self.doc.force_sync(content, version) {
            self.surface.set_content(content);
            self.cursors.reattach_detached();
            self.cursors.reposition_all(&self.surface);
            // Anything buffered against the provisional document is void now
            self.log.clear();
        }
        self.phase = Phase::Ready;
        self.pending_pull = None;
        self.dirty = true;
        // Catch anything sequenced since the snapshot was taken
        self.issue_pull()
    }

    fn handle_updates(&mut self, version: u64, updates: &[VersionedUpdate]) -> Vec<Message> {
        // Any updates response, empty or not, clears the outstanding pull
        let probe = self.pending_pull.take();

        // An ordered transport processed our in-flight push before a pull it
        // covers; a covering response without our echo means the push never
        // reached the log, so re-open the batch for the next flush.
        if let Some(probe) = probe {
            if probe.covers_push
                && self.log.is_in_flight()
                && !updates.iter().any(|u| u.client_id == self.identity.client_id)
            {
                debug!(since = probe.since, "Push superseded, re-opening batch");
                self.log.supersede();
            }
        }

        if updates.is_empty() {
            return Vec::new();
        }
        if version <= self.doc.version() {
            debug!(
                incoming = version,
                current = self.doc.version(),
                "Stale update batch, skipping"
            );
            return Vec::new();
        }

        let mut own_confirmed = false;
        for update in updates {
            if update.version <= self.doc.version() {
                continue; // duplicate entry inside a partially-new batch
            }
            if update.version != self.doc.version() + 1 {
                warn!(
                    incoming = update.version,
                    current = self.doc.version(),
                    "Version gap in updates, pulling to resync"
                );
                if own_confirmed {
                    self.log.acknowledge();
                }
                self.finish_apply();
                return self.issue_pull();
            }

            if update.client_id == self.identity.client_id {
                // Our own operation echoed back: content is already local,
                // only the version bookkeeping advances.
                own_confirmed = true;
            } else {
                let op = match codec::decode_update(update) {
                    Ok(op) => op,
                    Err(e) => {
                        warn!(error = %e, version = update.version, "Dropping undecodable update batch");
                        if own_confirmed {
                            self.log.acknowledge();
                        }
                        self.finish_apply();
                        return Vec::new();
                    }
                };
                match self.doc.apply(&op) {
                    Ok(()) => match op.kind {
                        OpKind::Insert => self.surface.apply_insert(op.position, &op.text),
                        OpKind::Delete => self.surface.apply_delete(op.position, op.char_len()),
                    },
                    Err(e) => {
                        // The sequencer skipped it too; versions stay aligned
                        warn!(error = %e, "Skipping out-of-range operation");
                    }
                }
            }

            if let Err(e) = self.doc.advance_to(update.version) {
                warn!(error = %e, "Version bookkeeping failure");
            }
            self.dirty = true;
        }

        if own_confirmed {
            self.log.acknowledge();
        }
        self.finish_apply();
        Vec::new()
    }

    fn handle_legacy(
        &mut self,
        kind: OpKind,
        content: String,
        position: usize,
        user_id: String,
    ) -> Vec<Message> {
        if user_id == self.identity.client_id {
            return Vec::new(); // our own keystroke echoed back
        }
        let op = Operation {
            kind,
            position,
            text: content,
            client_id: user_id,
            base_version: self.doc.version(),
        };
        match self.doc.apply(&op) {
            Ok(()) => {
                match op.kind {
                    OpKind::Insert => self.surface.apply_insert(op.position, &op.text),
                    OpKind::Delete => self.surface.apply_delete(op.position, op.char_len()),
                }
                self.dirty = true;
                self.finish_apply();
            }
            Err(e) => warn!(error = %e, "Skipping out-of-range legacy operation"),
        }
        Vec::new()
    }

    fn handle_cursor(&mut self, position: usize, user_id: String) -> Vec<Message> {
        if user_id != self.identity.client_id {
            self.cursors.report(&user_id, position, &self.surface);
            self.dirty = true;
        }
        Vec::new()
    }

    fn handle_leave(&mut self, user_id: String) -> Vec<Message> {
        self.cursors.remove(&user_id);
        self.peer_names.remove(&user_id);
        self.dirty = true;
        Vec::new()
    }

    fn handle_name(&mut self, alias: String, user_id: String) -> Vec<Message> {
        if user_id != self.identity.client_id {
            self.peer_names.insert(user_id, alias);
            self.dirty = true;
        }
        Vec::new()
    }

    // ---- local edits ----

    /// Structured per-edit ranges from the editing surface, used verbatim.
    ///
    /// The surface already holds the post-edit text; this records the edits
    /// against the engine document and buffers them for the next push.
    pub fn local_changes(&mut self, ranges: &[ChangeRange]) -> Vec<Message> {
        if matches!(self.phase, Phase::Disconnected) {
            return Vec::new();
        }

        for range in ranges {
            if range.to_old < range.from_old {
                warn!(?range, "Ignoring inverted change range");
                continue;
            }
            let deleted_span = range.to_old - range.from_old;
            if deleted_span > 0 {
                let deleted: String = self
                    .doc
                    .content()
                    .chars()
                    .skip(range.from_new)
                    .take(deleted_span)
                    .collect();
                let op = Operation::delete(
                    range.from_new,
                    deleted,
                    self.identity.client_id.clone(),
                    self.doc.version(),
                );
                match self.doc.apply(&op) {
                    Ok(()) => self.log.record(op),
                    Err(e) => {
                        warn!(error = %e, "Dropping out-of-range local deletion");
                        continue;
                    }
                }
            }
            if !range.inserted.is_empty() {
                let op = Operation::insert(
                    range.from_new,
                    range.inserted.clone(),
                    self.identity.client_id.clone(),
                    self.doc.version(),
                );
                match self.doc.apply(&op) {
                    Ok(()) => self.log.record(op),
                    Err(e) => warn!(error = %e, "Dropping out-of-range local insertion"),
                }
            }
            self.dirty = true;
        }

        self.cursors.reposition_all(&self.surface);
        self.caret_moved(self.surface.caret())
    }

    /// Fallback path: diff a full before/after snapshot.
    ///
    /// Used when the surface cannot report structured ranges. A failed
    /// extraction is a silent no-op.
    pub fn local_snapshot(&mut self, new_text: &str) -> Vec<Message> {
        if matches!(self.phase, Phase::Disconnected) {
            return Vec::new();
        }

        let Some(found) = diff::extract(self.doc.content(), new_text) else {
            return Vec::new();
        };
        let op = Operation {
            kind: found.kind,
            position: found.position,
            text: found.text,
            client_id: self.identity.client_id.clone(),
            base_version: self.doc.version(),
        };
        match self.doc.apply(&op) {
            Ok(()) => self.log.record(op),
            Err(e) => warn!(error = %e, "Dropping out-of-range snapshot diff"),
        }

        // When the single-region hypothesis failed the applied operation does
        // not reconstruct the snapshot; adopt the surface text to stay aligned.
        if self.doc.content() != new_text {
            let version = self.doc.version();
            self.doc.force_sync(new_text, version);
        }

        self.dirty = true;
        self.cursors.reposition_all(&self.surface);
        self.caret_moved(self.surface.caret())
    }

    /// The local caret moved; presence is re-announced on every report
    pub fn caret_moved(&mut self, position: usize) -> Vec<Message> {
        if !matches!(self.phase, Phase::Ready) {
            return Vec::new();
        }
        vec![Message::cursor(position, self.identity.client_id.as_str())]
    }

    /// Rename re-announces presence; no document resync involved
    pub fn rename(&mut self, alias: &str) -> Vec<Message> {
        self.identity.display_name = alias.to_string();
        if !matches!(self.phase, Phase::Ready) {
            return Vec::new();
        }
        vec![Message::name(alias, self.identity.client_id.as_str())]
    }

    // ---- timers ----

    /// Debounce expiry: flush the pending batch if the control rules allow
    pub fn flush_push(&mut self) -> Vec<Message> {
        if !matches!(self.phase, Phase::Ready) {
            return Vec::new();
        }
        let base = self.doc.version();
        let client_id = self.identity.client_id.clone();
        let Some(batch) = self.log.begin_push() else {
            return Vec::new();
        };
        match codec::encode_batch(batch, base) {
            Ok(updates) => vec![Message::push(updates, base, client_id)],
            Err(e) => {
                warn!(error = %e, "Failed to encode push batch");
                self.log.supersede();
                Vec::new()
            }
        }
    }

    /// Heartbeat: pull if connected and no pull is outstanding
    pub fn pull_tick(&mut self) -> Vec<Message> {
        if !matches!(self.phase, Phase::Ready) {
            return Vec::new();
        }
        self.issue_pull()
    }

    /// The transport dropped; clear all ephemeral state.
    ///
    /// Reconnecting is a fresh handshake: the discarded pending batch is
    /// never replayed, the server's snapshot wins.
    pub fn disconnected(&mut self) {
        self.phase = Phase::Disconnected;
        self.log.clear();
        self.pending_pull = None;
        self.cursors.clear();
        self.peer_names.clear();
        self.identity.client_id.clear();
        self.dirty = true;
    }

    // ---- internals ----

    fn issue_pull(&mut self) -> Vec<Message> {
        if self.pending_pull.is_some() {
            return Vec::new(); // a pull is already outstanding
        }
        self.pending_pull = Some(PullProbe {
            since: self.doc.version(),
            covers_push: self.log.is_in_flight(),
        });
        vec![Message::pull(self.doc.version(), self.identity.client_id.as_str())]
    }

    fn finish_apply(&mut self) {
        self.cursors.reattach_detached();
        self.cursors.reposition_all(&self.surface);
    }
}
