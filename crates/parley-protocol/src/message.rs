//! The chat message exchanged between peers.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Whole seconds since the Unix epoch.
pub type Timestamp = u64;

/// A single chat message.
///
/// Messages carry no identity beyond their fields: no sequence number,
/// no delivery token. Once stamped they are never modified again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identity of the sending connection, as claimed by the sender.
    pub sender: String,
    /// Identity the message is addressed to.
    pub receiver: String,
    /// Message body.
    pub content: String,
    /// Ingestion time, truncated to the second. Stamped by the relay;
    /// absent or client-supplied values are overwritten on receipt.
    #[serde(default)]
    pub time: Timestamp,
}

impl Message {
    /// Create a new, unstamped message.
    #[must_use]
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            content: content.into(),
            time: 0,
        }
    }

    /// Stamp the message with the current wall clock, truncated to the
    /// second. Sub-second precision is deliberately discarded so that
    /// timestamps compare and log uniformly.
    pub fn stamp(&mut self) {
        self.time = unix_seconds(SystemTime::now());
    }
}

/// Truncate a wall-clock instant to whole seconds since the Unix epoch.
///
/// Instants before the epoch map to 0.
#[must_use]
pub fn unix_seconds(t: SystemTime) -> Timestamp {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
