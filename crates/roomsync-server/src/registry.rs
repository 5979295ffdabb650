use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use roomsync_core::{ConnectionId, Identity};

use crate::connection::{Connection, Outbound};

/// Registry of all live connections, keyed by id.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    max_send_queue: usize,
}

impl ConnectionRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            connections: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a new connection and return it with the receiving half of its queue.
    ///
    /// `closed` should be a child of the server's shutdown token.
    pub fn register(
        &self,
        identity: Identity,
        closed: CancellationToken,
    ) -> (Arc<Connection>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let conn = Arc::new(Connection::new(ConnectionId::new(), identity, tx, closed));
        let _ = self.connections.insert(conn.id.clone(), Arc::clone(&conn));
        (conn, rx)
    }

    /// Remove a connection by id, returning it if it was still registered.
    pub fn unregister(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.remove(id).map(|(_, conn)| conn)
    }

    /// Number of connected clients.
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Ids of connections that have not answered a ping within `timeout_secs`.
    pub fn stale(&self, timeout_secs: u64) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|entry| entry.value().silent_for_secs() >= timeout_secs)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Remove every connection. Used at shutdown.
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter_map(|id| self.unregister(id)).collect()
    }
}
