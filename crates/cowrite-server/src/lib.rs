//! CoWrite Server - the authoritative sequencer
//!
//! Provides the server side of CoWrite:
//! - Hub: room registry with per-room isolation
//! - Room: version assignment, change log, broadcast
//! - WebSocket listener on `/ws/{room}`

pub mod hub;
pub mod room;
pub mod websocket;

pub use hub::Hub;
pub use room::Room;
pub use websocket::WsServer;
