//! Client error types

use thiserror::Error;

/// Errors surfaced by the sync client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Transport lost: {0}")]
    TransportLost(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] cowrite_protocol::ProtocolError),

    #[error("Core error: {0}")]
    Core(#[from] cowrite_core::Error),
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
