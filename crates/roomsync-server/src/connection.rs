//! One live client connection as seen by the gateway.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use roomsync_core::{ConnectionId, Identity, RoomId};

/// Outbound frame, shared between all recipients of one broadcast.
pub type Outbound = Arc<str>;

/// Handle to a connected client.
///
/// Cheap to share; the gateway hands `Arc<Connection>` to the router for
/// every room the client joins.
pub struct Connection {
    pub id: ConnectionId,
    pub identity: Identity,
    tx: mpsc::Sender<Outbound>,
    rooms: Mutex<BTreeSet<RoomId>>,
    open: AtomicBool,
    /// Fired when the connection leaves the gateway; the session watches it.
    closed: CancellationToken,
    last_pong: AtomicU64,
    dropped: AtomicU64,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        identity: Identity,
        tx: mpsc::Sender<Outbound>,
        closed: CancellationToken,
    ) -> Self {
        Self {
            id,
            identity,
            tx,
            rooms: Mutex::new(BTreeSet::new()),
            open: AtomicBool::new(true),
            closed,
            last_pong: AtomicU64::new(now_secs()),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Mark the connection closed and wake its session. Returns true only
    /// for the first caller.
    pub(crate) fn close(&self) -> bool {
        let first = self.open.swap(false, Ordering::AcqRel);
        self.closed.cancel();
        first
    }

    /// Token cancelled once the connection is closed or the server stops.
    pub fn closed_token(&self) -> &CancellationToken {
        &self.closed
    }

    /// Queue a frame without waiting. Returns false if the connection is
    /// closed or its queue is full; the frame is dropped in both cases.
    pub fn send(&self, frame: Outbound) -> bool {
        if !self.is_open() {
            return false;
        }
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(frame)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    conn_id = %self.id,
                    msg_len = frame.len(),
                    "send queue full, dropping message"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Rooms this connection currently belongs to.
    pub fn rooms(&self) -> Vec<RoomId> {
        self.rooms.lock().iter().cloned().collect()
    }

    pub(crate) fn track_room(&self, room: &RoomId) -> bool {
        self.rooms.lock().insert(room.clone())
    }

    pub(crate) fn forget_room(&self, room: &RoomId) {
        let _ = self.rooms.lock().remove(room);
    }

    pub(crate) fn take_rooms(&self) -> BTreeSet<RoomId> {
        std::mem::take(&mut *self.rooms.lock())
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    /// Seconds since the last pong (or since connecting).
    pub fn silent_for_secs(&self) -> u64 {
        now_secs().saturating_sub(self.last_pong.load(Ordering::Relaxed))
    }

    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn backdate_pong(&self, secs: u64) {
        self.last_pong.store(now_secs().saturating_sub(secs), Ordering::Relaxed);
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
