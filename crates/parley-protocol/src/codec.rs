//! JSON codec for chat messages.
//!
//! One message per WebSocket frame, UTF-8 JSON. There is no length
//! prefix or framing of our own; the WebSocket layer delimits frames.

use crate::message::Message;
use thiserror::Error;

/// Errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON serialization failed.
    #[error("encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    /// The frame payload is not a valid message.
    #[error("decoding error: {0}")]
    Decode(#[source] serde_json::Error),

    /// The frame payload is not valid UTF-8.
    #[error("frame payload is not valid UTF-8")]
    NotUtf8,
}

/// Encode a message to its JSON text form.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(message: &Message) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(ProtocolError::Encode)
}

/// Decode a message from JSON text.
///
/// # Errors
///
/// Returns an error if the text is not a valid message.
pub fn decode(text: &str) -> Result<Message, ProtocolError> {
    serde_json::from_str(text).map_err(ProtocolError::Decode)
}

/// Decode a message from a raw frame payload.
///
/// Some clients send JSON in binary frames; accept those too.
///
/// # Errors
///
/// Returns an error if the payload is not UTF-8 or not a valid message.
pub fn decode_bytes(data: &[u8]) -> Result<Message, ProtocolError> {
    let text = std::str::from_utf8(data).map_err(|_| ProtocolError::NotUtf8)?;
    decode(text)
}
