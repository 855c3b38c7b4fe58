//! The connection registry.
//!
//! One task owns the map of live connections and is the only code that
//! ever mutates it. Sessions talk to it exclusively through a mailbox of
//! [`RegistryEvent`] values; the loop applies one event end to end before
//! taking the next, which is the whole synchronization story — there is
//! no lock on the map because there is only one mutator.
//!
//! The mailbox is unbounded: senders never block, at the cost of
//! unbounded growth if the loop stalls behind a slow receiving peer.

use crate::connection::Outbound;
use crate::identity::{identity_matches, Identity};
use parley_protocol::Message;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Token distinguishing successive connections under the same identity.
pub type SessionToken = u64;

/// Atomic counter backing [`next_session_token`].
static TOKEN_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique session token.
#[must_use]
pub fn next_session_token() -> SessionToken {
    TOKEN_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Events accepted by the registry mailbox.
pub enum RegistryEvent {
    /// A new connection joined under `identity`.
    Join {
        identity: Identity,
        token: SessionToken,
        outbound: Box<dyn Outbound>,
    },
    /// The connection that joined with `token` is gone. A leave whose
    /// token does not match the current entry is stale (the entry was
    /// already replaced by a reconnect) and is ignored.
    Leave {
        identity: Identity,
        token: SessionToken,
    },
    /// Route a message to the connection(s) matching its receiver.
    Deliver { message: Message },
    /// Read-only snapshot of registry state.
    Stats {
        reply: oneshot::Sender<RegistryStats>,
    },
}

/// A snapshot of registry state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of live connections.
    pub connections: usize,
}

/// Cloneable handle for submitting events to the registry.
///
/// All operations are fire-and-forget: the caller gets no acknowledgment
/// and never blocks on the registry loop.
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::UnboundedSender<RegistryEvent>,
}

impl RegistryHandle {
    /// Announce a new connection. An empty identity is ignored by the
    /// loop; a duplicate identity replaces (and closes) the old entry.
    pub fn join(&self, identity: Identity, token: SessionToken, outbound: Box<dyn Outbound>) {
        self.send(RegistryEvent::Join {
            identity,
            token,
            outbound,
        });
    }

    /// Announce a departed connection. Idempotent; ignored if the entry
    /// for `identity` no longer belongs to `token`.
    pub fn leave(&self, identity: Identity, token: SessionToken) {
        self.send(RegistryEvent::Leave { identity, token });
    }

    /// Submit a message for best-effort delivery.
    pub fn deliver(&self, message: Message) {
        self.send(RegistryEvent::Deliver { message });
    }

    /// Query a snapshot of registry state.
    ///
    /// Returns `None` if the registry loop is gone.
    pub async fn stats(&self) -> Option<RegistryStats> {
        let (reply, rx) = oneshot::channel();
        self.send(RegistryEvent::Stats { reply });
        rx.await.ok()
    }

    fn send(&self, event: RegistryEvent) {
        if self.tx.send(event).is_err() {
            warn!("registry mailbox closed, event dropped");
        }
    }
}

/// A registered connection: the write half plus the token of the
/// session that owns it.
struct ConnectionEntry {
    token: SessionToken,
    outbound: Box<dyn Outbound>,
}

/// The central connection registry.
///
/// Holds at most one write half per identity. A handle present in the
/// map is assumed live; a failed write is what proves otherwise, and the
/// entry is pruned on the spot.
pub struct Registry {
    connections: HashMap<Identity, ConnectionEntry>,
    rx: mpsc::UnboundedReceiver<RegistryEvent>,
}

impl Registry {
    /// Create a registry and the handle used to reach it.
    #[must_use]
    pub fn new() -> (Self, RegistryHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                connections: HashMap::new(),
                rx,
            },
            RegistryHandle { tx },
        )
    }

    /// Run the event loop.
    ///
    /// Events are applied strictly in mailbox order, one at a time.
    /// Returns only once every handle has been dropped; in the server
    /// the loop runs for the life of the process.
    pub async fn run(mut self) {
        info!("registry loop started");
        while let Some(event) = self.rx.recv().await {
            self.handle_event(event).await;
        }
        debug!("registry mailbox drained, loop exiting");
    }

    async fn handle_event(&mut self, event: RegistryEvent) {
        match event {
            RegistryEvent::Join {
                identity,
                token,
                outbound,
            } => {
                self.handle_join(identity, token, outbound).await;
            }
            RegistryEvent::Leave { identity, token } => self.handle_leave(&identity, token).await,
            RegistryEvent::Deliver { message } => self.handle_deliver(message).await,
            RegistryEvent::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    async fn handle_join(
        &mut self,
        identity: Identity,
        token: SessionToken,
        outbound: Box<dyn Outbound>,
    ) {
        if identity.is_empty() {
            warn!("join with empty identity ignored");
            return;
        }

        let entry = ConnectionEntry { token, outbound };
        if let Some(mut previous) = self.connections.insert(identity.clone(), entry) {
            // A reconnect under the same identity replaces the old entry.
            // Close the replaced connection rather than orphaning it; its
            // session's eventual leave carries the old token and is
            // ignored.
            warn!(identity = %identity, "duplicate join, closing previous connection");
            previous.outbound.close().await;
        } else {
            info!(identity = %identity, "client connected");
        }
    }

    async fn handle_leave(&mut self, identity: &str, token: SessionToken) {
        // Only the session that owns the current entry may remove it. A
        // leave from a replaced session arrives with a stale token after
        // the reconnect already took the slot.
        let current = self.connections.get(identity).map(|entry| entry.token);
        match current {
            Some(t) if t == token => {
                if let Some(mut entry) = self.connections.remove(identity) {
                    entry.outbound.close().await;
                    info!(identity = %identity, "client disconnected");
                }
            }
            Some(_) => {
                debug!(identity = %identity, "stale leave ignored");
            }
            // Idempotent: a session may announce departure more than once.
            None => {}
        }
    }

    async fn handle_deliver(&mut self, message: Message) {
        let targets: Vec<Identity> = self
            .connections
            .keys()
            .filter(|id| identity_matches(id, &message.receiver))
            .cloned()
            .collect();

        if targets.is_empty() {
            // Best effort: nobody home means a silent drop.
            debug!(receiver = %message.receiver, "no matching connection, message dropped");
            return;
        }

        for identity in targets {
            let Some(entry) = self.connections.get_mut(&identity) else {
                continue;
            };
            if let Err(e) = entry.outbound.send(&message).await {
                warn!(identity = %identity, error = %e, "write failed, pruning connection");
                if let Some(mut dead) = self.connections.remove(&identity) {
                    dead.outbound.close().await;
                }
            } else {
                debug!(identity = %identity, sender = %message.sender, "message delivered");
            }
        }
    }

    fn stats(&self) -> RegistryStats {
        RegistryStats {
            connections: self.connections.len(),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_handle() -> (RegistryHandle, mpsc::UnboundedReceiver<RegistryEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RegistryHandle { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionError;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Test double for the write half of a connection. Clones share
    /// state, so a test can keep one and hand the other to the registry.
    #[derive(Clone, Default)]
    struct MockConn {
        state: Arc<Mutex<MockState>>,
    }

    #[derive(Default)]
    struct MockState {
        sent: Vec<Message>,
        closed: bool,
        fail_sends: bool,
    }

    impl MockConn {
        fn new() -> Self {
            Self::default()
        }

        fn broken() -> Self {
            let conn = Self::default();
            conn.state.lock().unwrap().fail_sends = true;
            conn
        }

        fn boxed(&self) -> Box<dyn Outbound> {
            Box::new(self.clone())
        }

        fn sent(&self) -> Vec<Message> {
            self.state.lock().unwrap().sent.clone()
        }

        fn is_closed(&self) -> bool {
            self.state.lock().unwrap().closed
        }
    }

    #[async_trait]
    impl Outbound for MockConn {
        async fn send(&mut self, message: &Message) -> Result<(), ConnectionError> {
            let mut state = self.state.lock().unwrap();
            if state.fail_sends {
                return Err(ConnectionError::SendFailed("broken pipe".into()));
            }
            state.sent.push(message.clone());
            Ok(())
        }

        async fn close(&mut self) {
            self.state.lock().unwrap().closed = true;
        }
    }

    fn registry() -> Registry {
        Registry::new().0
    }

    fn msg(sender: &str, receiver: &str, content: &str) -> Message {
        Message::new(sender, receiver, content)
    }

    #[tokio::test]
    async fn test_join_then_deliver_routes_to_matching_identity() {
        let mut reg = registry();
        let conn_a = MockConn::new();
        let conn_b = MockConn::new();
        reg.handle_join("alice".into(), 1, conn_a.boxed()).await;
        reg.handle_join("bob".into(), 2, conn_b.boxed()).await;

        reg.handle_deliver(msg("x", "alice", "hi")).await;

        assert_eq!(conn_a.sent().len(), 1);
        assert_eq!(conn_a.sent()[0].content, "hi");
        assert!(conn_b.sent().is_empty());
    }

    #[tokio::test]
    async fn test_routing_is_case_insensitive() {
        let mut reg = registry();
        let conn = MockConn::new();
        reg.handle_join("alice".into(), 1, conn.boxed()).await;

        reg.handle_deliver(msg("bob", "Alice", "hi")).await;

        assert_eq!(conn.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let mut reg = registry();
        let conn = MockConn::new();
        reg.handle_join("alice".into(), 1, conn.boxed()).await;

        reg.handle_leave("alice", 1).await;
        assert!(conn.is_closed());
        assert_eq!(reg.stats().connections, 0);

        // Second leave is a no-op, not a fault.
        reg.handle_leave("alice", 1).await;
        assert_eq!(reg.stats().connections, 0);
    }

    #[tokio::test]
    async fn test_duplicate_join_replaces_and_closes_previous() {
        let mut reg = registry();
        let conn1 = MockConn::new();
        let conn2 = MockConn::new();
        reg.handle_join("alice".into(), 1, conn1.boxed()).await;
        reg.handle_join("alice".into(), 2, conn2.boxed()).await;

        assert_eq!(reg.stats().connections, 1);
        assert!(conn1.is_closed());

        reg.handle_deliver(msg("bob", "alice", "hi")).await;
        assert!(conn1.sent().is_empty());
        assert_eq!(conn2.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_survives_stale_leave_from_replaced_session() {
        let mut reg = registry();
        let conn1 = MockConn::new();
        let conn2 = MockConn::new();

        // A reconnect replaces the entry; closing conn1 ends its session,
        // whose leave then arrives with the old token.
        reg.handle_join("alice".into(), 1, conn1.boxed()).await;
        reg.handle_join("alice".into(), 2, conn2.boxed()).await;
        reg.handle_leave("alice", 1).await;

        // The stale leave must not evict the new connection.
        assert_eq!(reg.stats().connections, 1);
        assert!(!conn2.is_closed());

        reg.handle_deliver(msg("bob", "alice", "hi")).await;
        assert_eq!(conn2.sent().len(), 1);

        // The current session's own leave still works.
        reg.handle_leave("alice", 2).await;
        assert_eq!(reg.stats().connections, 0);
        assert!(conn2.is_closed());
    }

    #[tokio::test]
    async fn test_empty_identity_join_is_ignored() {
        let mut reg = registry();
        let conn = MockConn::new();
        reg.handle_join(String::new(), 1, conn.boxed()).await;
        assert_eq!(reg.stats().connections, 0);
    }

    #[tokio::test]
    async fn test_dead_peer_pruned_on_write_failure() {
        let mut reg = registry();
        let conn = MockConn::broken();
        reg.handle_join("alice".into(), 1, conn.boxed()).await;

        reg.handle_deliver(msg("bob", "alice", "hi")).await;

        // Pruned inline during the failed delivery, no Leave required.
        assert_eq!(reg.stats().connections, 0);
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_self_delivery_is_permitted() {
        let mut reg = registry();
        let conn = MockConn::new();
        reg.handle_join("alice".into(), 1, conn.boxed()).await;

        reg.handle_deliver(msg("alice", "alice", "note to self")).await;

        assert_eq!(conn.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_unregistered_receiver_is_a_silent_drop() {
        let mut reg = registry();
        let conn = MockConn::new();
        reg.handle_join("alice".into(), 1, conn.boxed()).await;

        reg.handle_deliver(msg("alice", "nobody", "hello?")).await;

        assert!(conn.sent().is_empty());
        assert_eq!(reg.stats().connections, 1);
    }

    #[tokio::test]
    async fn test_stats_tracks_joins_and_leaves() {
        let mut reg = registry();
        reg.handle_join("alice".into(), 1, MockConn::new().boxed()).await;
        reg.handle_join("bob".into(), 2, MockConn::new().boxed()).await;
        assert_eq!(reg.stats().connections, 2);

        reg.handle_leave("alice", 1).await;
        assert_eq!(reg.stats().connections, 1);
    }

    #[tokio::test]
    async fn test_mailbox_processes_events_in_order() {
        let (reg, handle) = Registry::new();
        tokio::spawn(reg.run());

        let conn = MockConn::new();
        handle.join("alice".into(), 1, conn.boxed());
        handle.deliver(msg("bob", "alice", "first"));
        handle.deliver(msg("bob", "alice", "second"));
        handle.leave("alice".into(), 1);
        handle.deliver(msg("bob", "alice", "too late"));

        // Stats goes through the same mailbox, so its reply doubles as a
        // barrier for everything queued above.
        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.connections, 0);

        let contents: Vec<String> = conn.sent().iter().map(|m| m.content.clone()).collect();
        assert_eq!(contents, vec!["first", "second"]);
        assert!(conn.is_closed());
    }
}
