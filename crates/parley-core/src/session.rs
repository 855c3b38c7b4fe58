//! Connection sessions.
//!
//! A session owns the read half of one connection for its whole life:
//! announce the join, pump inbound messages into the registry, announce
//! the leave. One session per connection, fully independent of all
//! others.

use crate::connection::{Inbound, Outbound};
use crate::identity::Identity;
use crate::registry::{next_session_token, RegistryHandle, SessionToken};
use tracing::{debug, info, warn};

/// The owning wrapper around one connection's read half.
pub struct Session<R: Inbound> {
    identity: Identity,
    token: SessionToken,
    inbound: R,
    registry: RegistryHandle,
}

impl<R: Inbound> Session<R> {
    /// Open a session for an accepted connection.
    ///
    /// The write half goes to the registry immediately (the join
    /// announcement); the read half stays here. The join is tagged with
    /// a fresh session token so that, if a reconnect replaces this
    /// entry, this session's eventual leave cannot evict the newcomer.
    /// The identity must be non-empty — callers validate it before the
    /// connection is accepted.
    pub fn open(
        identity: Identity,
        inbound: R,
        outbound: Box<dyn Outbound>,
        registry: RegistryHandle,
    ) -> Self {
        let token = next_session_token();
        registry.join(identity.clone(), token, outbound);
        Self {
            identity,
            token,
            inbound,
            registry,
        }
    }

    /// Run the read loop until the connection ends.
    ///
    /// Every inbound message is stamped with the current wall clock
    /// (whole seconds) and forwarded for delivery. Any read or decode
    /// failure is terminal; nothing is retried. Every exit path
    /// announces the leave and then drops the read half — the registry
    /// closes the write half when it processes the leave.
    pub async fn run(mut self) {
        loop {
            match self.inbound.next().await {
                Some(Ok(mut message)) => {
                    message.stamp();
                    debug!(
                        identity = %self.identity,
                        sender = %message.sender,
                        receiver = %message.receiver,
                        time = message.time,
                        "message received"
                    );
                    self.registry.deliver(message);
                }
                Some(Err(e)) => {
                    // Classification only; cleanup is the same either way.
                    warn!(identity = %self.identity, error = %e, "read failed, closing session");
                    break;
                }
                None => {
                    info!(identity = %self.identity, "peer closed connection");
                    break;
                }
            }
        }

        self.registry.leave(self.identity, self.token);
    }
}
