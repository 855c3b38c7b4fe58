//! Capability traits for one live connection.
//!
//! A connection is split once, when it is accepted: the read half
//! ([`Inbound`]) belongs to the session's read loop, the write/close
//! half ([`Outbound`]) is handed to the registry at join time. Each half
//! has exactly one owner, so neither needs synchronization of its own.

use async_trait::async_trait;
use parley_protocol::Message;
use thiserror::Error;

/// Connection-level errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Failed to write a message.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Failed to read from the transport.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// An inbound frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Write/close capability over one connection. Held by the registry.
#[async_trait]
pub trait Outbound: Send {
    /// Write one message to the peer.
    ///
    /// # Errors
    ///
    /// Any error is terminal for this connection: the registry prunes it
    /// rather than retrying.
    async fn send(&mut self, message: &Message) -> Result<(), ConnectionError>;

    /// Close the connection. Best-effort; the peer may already be gone.
    async fn close(&mut self);
}

/// Read capability over one connection. Held by the session.
#[async_trait]
pub trait Inbound: Send {
    /// Read and decode the next inbound message.
    ///
    /// Returns `None` on a graceful peer close. Any `Err` is terminal
    /// for the session; reads are never retried.
    async fn next(&mut self) -> Option<Result<Message, ConnectionError>>;
}
