//! # parley-transport
//!
//! WebSocket adapters for the parley relay.
//!
//! An upgraded axum socket is split exactly once into its two capability
//! halves: [`WsOutbound`] (write/close, handed to the registry) and
//! [`WsInbound`] (read, kept by the session). The split is what lets the
//! session read while the registry writes without any shared lock.
//!
//! ```rust,ignore
//! use parley_transport::split;
//!
//! let (outbound, inbound) = split(socket);
//! let session = Session::open(identity, inbound, Box::new(outbound), registry);
//! session.run().await;
//! ```

pub mod websocket;

pub use websocket::{split, WsInbound, WsOutbound};
