//! Connection registry.
//!
//! Maps each authenticated user to the one socket that currently owns it.
//! Backed by a DashMap so sessions on different sockets can look up and
//! push to each other without a global lock. Nothing here is persisted;
//! the registry is rebuilt as clients reconnect.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use campus_core::UserId;

use crate::protocol::ServerFrame;

/// Outbound channel of one socket, drained by its writer task.
pub type ClientSender = mpsc::UnboundedSender<ServerFrame>;

/// Handle to a live socket.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    /// Unique per socket, so a late close can tell whether the entry is still its own.
    pub connection_id: Uuid,
    pub sender: ClientSender,
}

impl ClientHandle {
    pub fn new(sender: ClientSender) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            sender,
        }
    }

    /// Queue a frame for this socket. Returns false if the socket is gone.
    pub fn send(&self, frame: ServerFrame) -> bool {
        self.sender.send(frame).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// User id → live socket. Last connection wins.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    clients: Arc<DashMap<UserId, ClientHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `user_id` to `handle`, replacing any previous socket.
    /// Returns the displaced handle, if there was one.
    pub fn register(&self, user_id: UserId, handle: ClientHandle) -> Option<ClientHandle> {
        let connection_id = handle.connection_id;
        let previous = self.clients.insert(user_id, handle);

        match &previous {
            Some(old) => tracing::info!(
                user_id = user_id,
                connection_id = %connection_id,
                replaced = %old.connection_id,
                "Client re-registered, previous connection superseded"
            ),
            None => tracing::info!(
                user_id = user_id,
                connection_id = %connection_id,
                "Client registered"
            ),
        }

        previous
    }

    /// Remove the mapping for `user_id`. No-op if absent.
    pub fn unregister(&self, user_id: UserId) {
        if self.clients.remove(&user_id).is_some() {
            tracing::info!(user_id = user_id, "Client unregistered");
        }
    }

    /// Remove the mapping only if it still belongs to `connection_id`.
    ///
    /// Returns true if an entry was removed.
    pub fn unregister_connection(&self, user_id: UserId, connection_id: Uuid) -> bool {
        let removed = self
            .clients
            .remove_if(&user_id, |_, handle| handle.connection_id == connection_id)
            .is_some();

        if removed {
            tracing::info!(
                user_id = user_id,
                connection_id = %connection_id,
                "Client unregistered"
            );
        } else {
            tracing::debug!(
                user_id = user_id,
                connection_id = %connection_id,
                "Closed connection was already superseded"
            );
        }

        removed
    }

    /// The live handle for `user_id`, if any.
    ///
    /// The handle is cloned out so no shard lock outlives the call.
    pub fn lookup(&self, user_id: UserId) -> Option<ClientHandle> {
        self.clients.get(&user_id).map(|entry| entry.value().clone())
    }

    /// Push a frame to an online user. Returns true if it was queued.
    pub fn send_to(&self, user_id: UserId, frame: ServerFrame) -> bool {
        match self.lookup(user_id) {
            Some(handle) => handle.send(frame),
            None => false,
        }
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.clients.contains_key(&user_id)
    }

    pub fn online_count(&self) -> usize {
        self.clients.len()
    }

    /// Ids of all registered users, ascending.
    pub fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.clients.iter().map(|entry| *entry.key()).collect();
        users.sort_unstable();
        users
    }

    /// Drop entries whose writer task has already exited.
    ///
    /// Normally a closing socket unregisters itself; this catches sessions
    /// that died without reaching their cleanup.
    pub fn prune_closed(&self) -> usize {
        let before = self.clients.len();
        self.clients.retain(|_, handle| !handle.is_closed());
        let pruned = before.saturating_sub(self.clients.len());

        if pruned > 0 {
            tracing::debug!(count = pruned, "Pruned closed connections");
        }

        pruned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_unregister() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        assert!(registry.register(1, ClientHandle::new(tx)).is_none());
        assert!(registry.is_online(1));
        assert_eq!(registry.online_count(), 1);

        registry.unregister(1);
        assert!(!registry.is_online(1));
        assert_eq!(registry.online_count(), 0);

        // Idempotent
        registry.unregister(1);
        assert!(registry.lookup(1).is_none());
    }

    #[test]
    fn test_send_to_online_client() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(1, ClientHandle::new(tx));

        assert!(registry.send_to(1, ServerFrame::error("ping")));
        assert_eq!(rx.try_recv().unwrap(), ServerFrame::error("ping"));
    }

    #[test]
    fn test_send_to_offline_client_returns_false() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.send_to(42, ServerFrame::error("nobody home")));
    }

    #[test]
    fn test_last_connection_wins() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let first = ClientHandle::new(tx1);
        let second = ClientHandle::new(tx2);
        let first_id = first.connection_id;
        let second_id = second.connection_id;

        registry.register(1, first);
        let displaced = registry.register(1, second).unwrap();
        assert_eq!(displaced.connection_id, first_id);

        assert_eq!(registry.lookup(1).unwrap().connection_id, second_id);
        assert_eq!(registry.online_count(), 1);

        registry.send_to(1, ServerFrame::error("for the newest"));
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_superseded_connection_cannot_evict_newer() {
        let registry = ConnectionRegistry::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let first = ClientHandle::new(tx1);
        let second = ClientHandle::new(tx2);
        let first_id = first.connection_id;
        let second_id = second.connection_id;

        registry.register(1, first);
        registry.register(1, second);

        assert!(!registry.unregister_connection(1, first_id));
        assert!(registry.is_online(1));

        assert!(registry.unregister_connection(1, second_id));
        assert!(!registry.is_online(1));
    }

    #[test]
    fn test_online_users_sorted() {
        let registry = ConnectionRegistry::new();
        for user in [3, 1, 2] {
            let (tx, _rx) = mpsc::unbounded_channel();
            registry.register(user, ClientHandle::new(tx));
        }
        assert_eq!(registry.online_users(), vec![1, 2, 3]);
    }

    #[test]
    fn test_prune_closed() {
        let registry = ConnectionRegistry::new();
        let (tx_live, _rx_live) = mpsc::unbounded_channel();
        let (tx_dead, rx_dead) = mpsc::unbounded_channel();

        registry.register(1, ClientHandle::new(tx_live));
        registry.register(2, ClientHandle::new(tx_dead));
        drop(rx_dead);

        assert_eq!(registry.prune_closed(), 1);
        assert!(registry.is_online(1));
        assert!(!registry.is_online(2));
        assert_eq!(registry.prune_closed(), 0);
    }
}
