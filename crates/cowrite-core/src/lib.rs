//! CoWrite Core - Document Model and Sync Primitives
//!
//! This crate provides the core functionality for CoWrite:
//! - The shared text document with its monotonic version counter
//! - Positional insert/delete operations with inversion support
//! - Snapshot diffing (the fallback change extractor)
//! - The client-side versioned update log

pub mod diff;
pub mod document;
pub mod error;
pub mod operation;
pub mod sync;

pub use diff::{extract, DiffResult};
pub use document::{Document, RoomId};
pub use error::{Error, Result};
pub use operation::{OpKind, Operation};
pub use sync::UpdateLog;
