//! CoWrite Client - the synchronization engine
//!
//! This crate provides the client side of CoWrite:
//! - The reconciliation session (push/pull under version ordering)
//! - Remote cursor tracking and re-projection
//! - The editing-surface and cursor-renderer trait seams
//! - An async WebSocket connector driving the session
//!
//! The engine takes its collaborators as trait objects rather than reaching
//! into ambient state: the editing surface, the transport, and the cursor
//! renderer are all injected.

pub mod connector;
pub mod cursor;
pub mod error;
pub mod session;
pub mod surface;

pub use connector::{
    ClientCommand, ClientConfig, ClientEvent, SyncClient, DEFAULT_DEBOUNCE, DEFAULT_PULL_INTERVAL,
};
pub use cursor::{CursorRenderer, RemoteCursorRegistry};
pub use error::{ClientError, ClientResult};
pub use session::{Session, SessionIdentity, SessionState};
pub use surface::{BufferSurface, ChangeRange, EditorSurface};
