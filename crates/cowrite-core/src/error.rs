//! Error types for CoWrite Core

use thiserror::Error;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid room ID: {0}")]
    InvalidRoomId(String),

    #[error("{kind} position {position} out of range for document of length {len}")]
    OutOfRange {
        kind: &'static str,
        position: usize,
        len: usize,
    },

    #[error("Stale version: incoming {incoming} <= current {current}")]
    StaleVersion { incoming: u64, current: u64 },

    #[error("Version gap: incoming {incoming}, current {current}")]
    VersionGap { incoming: u64, current: u64 },
}

/// Result type alias for CoWrite Core operations
pub type Result<T> = std::result::Result<T, Error>;
