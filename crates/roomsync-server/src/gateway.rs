//! The protocol-facing operations: join, change, notify, disconnect.
//!
//! The gateway is the only path to the state store and the only owner of
//! the broadcast router. Each operation runs on behalf of one connection
//! and fails only for that connection.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use roomsync_core::{ConnectionId, Identity, Interaction, RoomId, RoomState, ServerEvent, SyncError};
use roomsync_store::StateStore;

use crate::connection::{Connection, Outbound};
use crate::registry::ConnectionRegistry;
use crate::router::{BroadcastRouter, RoomChannel};

pub struct Gateway {
    store: Arc<dyn StateStore>,
    router: Arc<BroadcastRouter>,
    registry: ConnectionRegistry,
    shutdown: CancellationToken,
}

impl Gateway {
    pub fn new(store: Arc<dyn StateStore>, max_send_queue: usize) -> Self {
        Self::with_shutdown(store, max_send_queue, CancellationToken::new())
    }

    /// Connections admitted by this gateway are closed when `shutdown` fires.
    pub fn with_shutdown(store: Arc<dyn StateStore>, max_send_queue: usize, shutdown: CancellationToken) -> Self {
        Self {
            store,
            router: Arc::new(BroadcastRouter::new()),
            registry: ConnectionRegistry::new(max_send_queue),
            shutdown,
        }
    }

    /// Admit an authenticated connection. It starts in zero rooms.
    pub fn connect(&self, identity: Identity) -> (Arc<Connection>, mpsc::Receiver<Outbound>) {
        let (conn, rx) = self.registry.register(identity, self.shutdown.child_token());
        info!(conn_id = %conn.id, identity = %conn.identity, "connection admitted");
        (conn, rx)
    }

    /// Add `conn` to `room_id` and send it the room's current state, if any.
    ///
    /// Runs under the room's commit lane so the unicast snapshot can never
    /// arrive after a newer broadcast.
    #[instrument(skip(self, conn), fields(conn_id = %conn.id))]
    pub async fn join_room(&self, conn: &Arc<Connection>, room_id: &str) -> Result<Option<RoomState>, SyncError> {
        let room = RoomId::parse(room_id)?;
        let channel = self.router.channel(&room);
        let result = self.join_locked(&channel, conn).await;
        self.router.release(channel);
        result
    }

    async fn join_locked(&self, channel: &RoomChannel, conn: &Arc<Connection>) -> Result<Option<RoomState>, SyncError> {
        let _lane = channel.lane().await;
        let room = channel.room_id();

        let added = self.router.join(channel, conn);
        if !conn.is_open() {
            // Lost a race with disconnect; don't leave a dangling member behind.
            self.router.leave(room, &conn.id);
            return Err(SyncError::ConnectionGone(conn.id.to_string()));
        }

        let current = match self.store.get_by_room(room).await {
            Ok(current) => current,
            Err(e) => {
                if added {
                    self.router.leave(room, &conn.id);
                    conn.forget_room(room);
                }
                return Err(e.into());
            }
        };
        if added {
            debug!(room_id = %room, "joined room");
        }
        if let Some(state) = &current {
            send_event(conn, &ServerEvent::StateChanged(state.clone()));
        }
        Ok(current)
    }

    /// Commit a new value for `room_id` and broadcast it to every member.
    ///
    /// The commit runs on its own task: if the caller goes away mid-flight
    /// the write still lands and remaining members still hear about it.
    #[instrument(skip(self, conn, value), fields(conn_id = %conn.id))]
    pub async fn change_state(&self, conn: &Connection, room_id: &str, value: &str) -> Result<RoomState, SyncError> {
        let room = RoomId::parse(room_id)?;
        ensure_open(conn)?;
        if value.is_empty() {
            return Err(SyncError::Validation("value must not be empty".into()));
        }

        let channel = self.router.channel(&room);
        let router = Arc::clone(&self.router);
        let store = Arc::clone(&self.store);
        let value = value.to_owned();
        let actor = conn.identity.as_str().to_owned();

        let commit = tokio::spawn(async move {
            let result = commit_locked(&channel, store.as_ref(), &value, &actor).await;
            router.release(channel);
            result
        });

        match commit.await {
            Ok(result) => result,
            Err(e) => {
                warn!(room_id = %room, error = %e, "commit task failed");
                // The task died before handing its channel back.
                self.router.release(self.router.channel(&room));
                Err(SyncError::Internal(format!("commit task failed: {e}")))
            }
        }
    }

    /// Broadcast a transient interaction to the room. Never touches the store.
    #[instrument(skip(self, conn), fields(conn_id = %conn.id))]
    pub fn notify_interaction(&self, conn: &Connection, room_id: &str, subject_id: &str) -> Result<usize, SyncError> {
        let room = RoomId::parse(room_id)?;
        ensure_open(conn)?;
        let event = ServerEvent::Interacted(Interaction {
            room_id: room.clone(),
            subject_id: subject_id.to_owned(),
            actor_identity: conn.identity.as_str().to_owned(),
            timestamp: Utc::now(),
        });
        Ok(self.router.broadcast(&room, &event))
    }

    /// Purge a connection from every room and end its session. Safe to call
    /// any number of times; only the first call does anything.
    pub fn disconnect(&self, id: &ConnectionId) -> bool {
        let Some(conn) = self.registry.unregister(id) else {
            return false;
        };
        if !conn.close() {
            return false;
        }
        let rooms = conn.take_rooms();
        for room in &rooms {
            self.router.leave(room, id);
        }
        info!(conn_id = %id, rooms = rooms.len(), dropped = conn.drop_count(), "connection closed");
        true
    }

    /// Disconnect everyone silent for at least `timeout_secs`.
    pub fn disconnect_stale(&self, timeout_secs: u64) -> usize {
        let stale = self.registry.stale(timeout_secs);
        let removed = stale.iter().filter(|id| self.disconnect(id)).count();
        if removed > 0 {
            info!(removed, "stale connection cleanup");
        }
        removed
    }

    /// Tear down all membership. Connections are closed; their sessions
    /// notice on the next send or read.
    pub fn shutdown(&self) {
        let drained = self.registry.drain();
        for conn in &drained {
            let _ = conn.close();
            let _ = conn.take_rooms();
        }
        self.router.clear();
        info!(connections = drained.len(), "gateway shut down");
    }

    pub fn connection_count(&self) -> usize {
        self.registry.count()
    }

    pub fn room_count(&self) -> usize {
        self.router.room_count()
    }

    pub fn member_count(&self, room_id: &RoomId) -> usize {
        self.router.member_count(room_id)
    }
}

/// Upsert and fan out while holding the room's lane.
async fn commit_locked(
    channel: &RoomChannel,
    store: &dyn StateStore,
    value: &str,
    actor: &str,
) -> Result<RoomState, SyncError> {
    let _lane = channel.lane().await;
    let state = store.upsert(channel.room_id(), value, actor).await?;
    let delivered = channel.broadcast(&ServerEvent::StateChanged(state.clone()));
    debug!(room_id = %channel.room_id(), delivered, "state committed");
    Ok(state)
}

fn ensure_open(conn: &Connection) -> Result<(), SyncError> {
    if conn.is_open() {
        Ok(())
    } else {
        Err(SyncError::ConnectionGone(conn.id.to_string()))
    }
}

fn send_event(conn: &Connection, event: &ServerEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => conn.send(json.into()),
        Err(e) => {
            warn!(event_type = event.event_type(), error = %e, "failed to serialize event");
            false
        }
    }
}
