//! Room state - one shared document and its change log
//!
//! The room is the sequencing authority: it assigns the monotonically
//! increasing version to every accepted pushed update, applies it to the
//! room document, and broadcasts the sequenced batch to every participant
//! (including the sender, whose echo doubles as the acknowledgment).

use std::collections::HashMap;

use cowrite_core::{Document, OpKind, Operation, RoomId};
use cowrite_protocol::{codec, now_millis, Message, VersionedUpdate};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A collaborative editing room
pub struct Room {
    id: RoomId,
    doc: Document,
    change_log: Vec<VersionedUpdate>,
    clients: HashMap<String, mpsc::Sender<Message>>,
    dirty: bool,
}

impl Room {
    pub fn new(id: RoomId) -> Self {
        Self::with_document(id, String::new())
    }

    /// Create a room around previously persisted content
    pub fn with_document(id: RoomId, content: String) -> Self {
        Self {
            id,
            doc: Document::with_content(content, 0),
            change_log: Vec::new(),
            clients: HashMap::new(),
            dirty: false,
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn content(&self) -> &str {
        self.doc.content()
    }

    pub fn version(&self) -> u64 {
        self.doc.version()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Whether the document changed since the last call (persistence hook)
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Add a participant and send them the connect handshake:
    /// their assigned identity, then the document snapshot.
    pub fn join(&mut self, client_id: &str, sender: mpsc::Sender<Message>) {
        self.clients.insert(client_id.to_string(), sender);
        self.send_to(client_id, Message::join(client_id));
        self.send_to(client_id, Message::version(self.doc.version(), self.doc.content()));
        debug!(
            client = %client_id,
            room = %self.id,
            clients = self.clients.len(),
            "Client joined room"
        );
    }

    /// Remove a participant and tell the others
    pub fn leave(&mut self, client_id: &str) {
        if self.clients.remove(client_id).is_some() {
            self.broadcast(Message::leave(client_id), Some(client_id));
            debug!(
                client = %client_id,
                room = %self.id,
                clients = self.clients.len(),
                "Client left room"
            );
        }
    }

    /// Dispatch one inbound message.
    ///
    /// `from` is the connection's server-assigned identity; it overrides
    /// whatever `user_id` the client put on the wire.
    pub fn handle_message(&mut self, from: &str, msg: Message) {
        match msg {
            Message::Push { updates, version, .. } => self.handle_push(from, updates, version),
            Message::Pull { version, .. } => self.handle_pull(from, version),
            Message::Insert {
                content, position, ..
            } => self.handle_legacy(OpKind::Insert, content, position, from),
            Message::Delete {
                content, position, ..
            } => self.handle_legacy(OpKind::Delete, content, position, from),
            Message::Cursor { position, .. } => {
                // Presence only; never touches the document
                self.broadcast(Message::cursor(position, from), Some(from));
            }
            Message::Name { content, .. } => {
                self.broadcast(Message::name(content, from), Some(from));
            }
            other => {
                debug!(from = %from, msg = ?other, "Ignoring server-bound message type");
            }
        }
    }

    fn handle_push(&mut self, from: &str, updates: Vec<VersionedUpdate>, base_version: u64) {
        debug!(
            from = %from,
            count = updates.len(),
            base = base_version,
            current = self.doc.version(),
            "Push received"
        );

        // A base older than the retained log cannot be sequenced; answer with
        // the full log so the client resyncs instead.
        let oldest = self.doc.version() - self.change_log.len() as u64;
        if base_version < oldest {
            warn!(
                from = %from,
                base = base_version,
                current = self.doc.version(),
                "Push base too far behind, replying with full log"
            );
            let all = self.change_log.clone();
            self.send_to(from, Message::updates(self.doc.version(), all));
            return;
        }

        let mut accepted = Vec::new();
        for mut update in updates {
            // Validate on accept: an undecodable update never enters the log
            let op = match codec::decode_update(&update) {
                Ok(op) => op,
                Err(e) => {
                    warn!(from = %from, error = %e, "Dropping undecodable pushed update");
                    continue;
                }
            };

            let next = self.doc.version() + 1;
            match self.doc.apply(&op) {
                Ok(()) => self.dirty = true,
                // Sequenced but skipped; clients apply the same skip rule so
                // replicas stay aligned.
                Err(e) => warn!(from = %from, error = %e, "Sequencing out-of-range operation without applying"),
            }
            if let Err(e) = self.doc.advance_to(next) {
                warn!(error = %e, "Version assignment failure");
                continue;
            }

            update.version = next;
            update.client_id = from.to_string();
            self.change_log.push(update.clone());
            accepted.push(update);
        }

        if accepted.is_empty() {
            return;
        }

        // Broadcast to ALL clients including the sender - the sender needs
        // the confirmation echo.
        self.broadcast(Message::updates(self.doc.version(), accepted), None);
    }

    fn handle_pull(&mut self, from: &str, since: u64) {
        debug!(
            from = %from,
            since = since,
            current = self.doc.version(),
            "Pull request"
        );

        // Log entry i holds version i+1; everything after `since` is missing
        let start = (since as usize).min(self.change_log.len());
        let updates = self.change_log[start..].to_vec();
        self.send_to(from, Message::updates(self.doc.version(), updates));
    }

    /// The non-versioned per-keystroke protocol variant
    fn handle_legacy(&mut self, kind: OpKind, content: String, position: usize, from: &str) {
        let op = Operation {
            kind,
            position,
            text: content,
            client_id: from.to_string(),
            base_version: self.doc.version(),
        };
        if let Err(e) = self.doc.apply(&op) {
            warn!(from = %from, error = %e, "Skipping out-of-range legacy operation");
            return;
        }
        self.dirty = true;

        let msg = match op.kind {
            OpKind::Insert => Message::Insert {
                content: op.text,
                position: op.position,
                user_id: from.to_string(),
                timestamp: now_millis(),
            },
            OpKind::Delete => Message::Delete {
                content: op.text,
                position: op.position,
                user_id: from.to_string(),
                timestamp: now_millis(),
            },
        };
        // Legacy operations echo to everyone except their author
        self.broadcast(msg, Some(from));
    }

    fn send_to(&self, client_id: &str, msg: Message) {
        if let Some(tx) = self.clients.get(client_id) {
            if tx.try_send(msg).is_err() {
                // Slow client; never block the room, the next pull self-heals
                warn!(client = %client_id, room = %self.id, "Outbox full, dropping message");
            }
        }
    }

    fn broadcast(&self, msg: Message, except: Option<&str>) {
        for (client_id, tx) in &self.clients {
            if Some(client_id.as_str()) == except {
                continue;
            }
            if tx.try_send(msg.clone()).is_err() {
                warn!(client = %client_id, room = %self.id, "Outbox full, dropping message");
            }
        }
    }
}
