//! CoWrite Sync Protocol
//!
//! JSON messages exchanged between editing clients and the authoritative
//! sequencer, over a WebSocket-like ordered message transport.
//!
//! ## Message Format
//! ```text
//! {"type":"push","updates":[{"version":N,"changes":"<op>","clientID":"c"}],"version":N,"user_id":"c"}
//! {"type":"pull","version":N,"user_id":"c"}
//! {"type":"updates","version":N,"updates":[...],"user_id":"server"}
//! {"type":"cursor","position":N,"user_id":"c"}
//! ```
//!
//! The `changes` field of an update carries one codec-encoded operation;
//! see [`codec`].

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{decode_op, decode_update, encode_batch, encode_op};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{now_millis, Message, VersionedUpdate, MAX_MESSAGE_SIZE, SERVER_ID};
