//! Client-side versioned update log
//!
//! Buffers locally-generated operations that the server has not yet
//! sequenced, and enforces the push control rules: a push is never empty,
//! and a second push never starts while one is unacknowledged.

use crate::operation::Operation;

/// Pending local operations awaiting server acknowledgment.
///
/// Operations accumulate through `record`; `begin_push` marks the current
/// batch as in flight, `acknowledge` drops it atomically once the server's
/// echo confirms sequencing, and `supersede` re-opens the batch for a retry
/// with a fresh base version (e.g. after remote updates landed first).
#[derive(Debug, Default)]
pub struct UpdateLog {
    pending: Vec<Operation>,
    in_flight: usize,
}

impl UpdateLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a locally-generated operation
    pub fn record(&mut self, op: Operation) {
        self.pending.push(op);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight > 0
    }

    /// Whether a push may start now: something to send, nothing in flight
    pub fn can_push(&self) -> bool {
        self.has_pending() && !self.is_in_flight()
    }

    /// Mark the whole pending batch as in flight and return it for encoding.
    ///
    /// Returns `None` when the control rules forbid a push.
    pub fn begin_push(&mut self) -> Option<&[Operation]> {
        if !self.can_push() {
            return None;
        }
        self.in_flight = self.pending.len();
        Some(&self.pending[..self.in_flight])
    }

    /// Drop the in-flight batch after the server's echo confirmed it.
    ///
    /// Operations recorded while the batch was in flight stay pending.
    pub fn acknowledge(&mut self) {
        self.pending.drain(..self.in_flight);
        self.in_flight = 0;
    }

    /// Re-open the in-flight batch so the next push retries it.
    pub fn supersede(&mut self) {
        self.in_flight = 0;
    }

    /// Discard everything - used on disconnect; stale local edits are never
    /// replayed into a fresh handshake.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.in_flight = 0;
    }
}
