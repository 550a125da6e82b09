//! Error types shared by the registry and its connections.

use crate::ids::{ConnectionId, Scope};

/// A write to one connection failed.
///
/// Always recovered locally: the registry drops the connection and keeps
/// delivering to everyone else.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The socket's writer has gone away.
    #[error("connection closed")]
    Closed,
    /// The outbound queue is full.
    #[error("send queue full")]
    QueueFull,
    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors surfaced to registry callers.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The message could not be encoded as JSON.
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The connection already occupies a different scope.
    #[error("connection {connection_id} is already registered in {existing}")]
    AlreadyRegistered {
        /// The connection being registered.
        connection_id: ConnectionId,
        /// Where it currently lives.
        existing: Scope,
    },
}
