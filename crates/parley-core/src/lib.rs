//! # parley-core
//!
//! Coordination core for the parley chat relay.
//!
//! This crate provides the two components with real design content:
//!
//! - **Registry** - A single-owner actor holding the authoritative set of
//!   live connections, reachable only through its mailbox
//! - **Session** - The owning wrapper around one connection's read half,
//!   translating raw inbound traffic into registry events
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  Join/Leave/Deliver   ┌─────────────┐
//! │   Session   │──────────────────────▶│  Registry   │
//! │ (per conn,  │       (mailbox)       │ (one task,  │
//! │  read half) │                       │ owns map +  │
//! └─────────────┘                       │ write halves)│
//!                                       └──────┬──────┘
//!                                              │ send/close
//!                                              ▼
//!                                       receiving peers
//! ```
//!
//! A connection is split once at accept time: the read capability stays
//! with its session, the write/close capability is handed to the registry
//! inside `Join`. No handle is ever touched by two tasks.

pub mod connection;
pub mod identity;
pub mod registry;
pub mod session;

pub use connection::{ConnectionError, Inbound, Outbound};
pub use identity::{identity_matches, validate_identity, Identity};
pub use parley_protocol::Message;
pub use registry::{
    next_session_token, Registry, RegistryEvent, RegistryHandle, RegistryStats, SessionToken,
};
pub use session::Session;
