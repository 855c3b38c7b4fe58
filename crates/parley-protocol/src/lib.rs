//! # parley-protocol
//!
//! Wire message definition and codec for the parley chat relay.
//!
//! The wire format is a single JSON object per WebSocket text frame:
//!
//! ```json
//! {"sender": "alice", "receiver": "bob", "content": "hi", "time": 1735689600}
//! ```
//!
//! `time` is in whole seconds since the Unix epoch. The relay stamps it
//! at ingestion; anything the sender puts there is overwritten.
//!
//! ## Example
//!
//! ```rust
//! use parley_protocol::{codec, Message};
//!
//! let msg = Message::new("alice", "bob", "hello");
//! let encoded = codec::encode(&msg).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(msg, decoded);
//! ```

pub mod codec;
pub mod message;

pub use codec::{decode, encode, ProtocolError};
pub use message::{unix_seconds, Message, Timestamp};
