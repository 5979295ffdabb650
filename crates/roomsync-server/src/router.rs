//! Room → members fan-out.
//!
//! Each room is an independent [`RoomChannel`]: its own member set and its
//! own commit lane. Nothing here ever locks more than one room.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use roomsync_core::{ConnectionId, RoomId, ServerEvent};

use crate::connection::{Connection, Outbound};

/// Members of one room plus the lane that orders its commits.
pub struct RoomChannel {
    room_id: RoomId,
    members: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    lane: tokio::sync::Mutex<()>,
}

impl RoomChannel {
    fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            members: RwLock::new(HashMap::new()),
            lane: tokio::sync::Mutex::new(()),
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Serializes state commits for this room. Held across the store call
    /// and the fan-out so members see broadcasts in commit order.
    pub async fn lane(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.lane.lock().await
    }

    pub fn member_count(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_member(&self, id: &ConnectionId) -> bool {
        self.members.read().contains_key(id)
    }

    fn insert(&self, conn: &Arc<Connection>) -> bool {
        self.members
            .write()
            .insert(conn.id.clone(), Arc::clone(conn))
            .is_none()
    }

    fn remove(&self, id: &ConnectionId) -> bool {
        self.members.write().remove(id).is_some()
    }

    /// Serialize once and queue to every current member. Returns the number
    /// of members the frame was queued for.
    pub fn broadcast(&self, event: &ServerEvent) -> usize {
        let frame: Outbound = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(event_type = event.event_type(), error = %e, "failed to serialize event");
                return 0;
            }
        };

        // Snapshot so no lock is held while sending.
        let members: Vec<Arc<Connection>> = self.members.read().values().cloned().collect();
        let mut delivered = 0;
        for conn in &members {
            if conn.send(Arc::clone(&frame)) {
                delivered += 1;
            } else {
                debug!(conn_id = %conn.id, room_id = %self.room_id, "dropped frame for unreachable member");
            }
        }
        debug!(
            event_type = event.event_type(),
            room_id = %self.room_id,
            recipients = members.len(),
            delivered,
            "broadcast event to room"
        );
        delivered
    }
}

/// Maps room ids to their channels.
#[derive(Default)]
pub struct BroadcastRouter {
    rooms: DashMap<RoomId, Arc<RoomChannel>>,
}

impl BroadcastRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel for `room`, created on first use.
    pub fn channel(&self, room: &RoomId) -> Arc<RoomChannel> {
        let entry = self
            .rooms
            .entry(room.clone())
            .or_insert_with(|| Arc::new(RoomChannel::new(room.clone())));
        Arc::clone(entry.value())
    }

    /// Give back a channel obtained from [`channel`](Self::channel), dropping
    /// the room if that left it idle.
    pub fn release(&self, channel: Arc<RoomChannel>) {
        let room = channel.room_id().clone();
        drop(channel);
        self.prune(&room);
    }

    /// Channel for `room` if it currently has members or an operation in flight.
    pub fn existing(&self, room: &RoomId) -> Option<Arc<RoomChannel>> {
        self.rooms.get(room).map(|entry| Arc::clone(entry.value()))
    }

    /// Add `conn` to `channel`. Returns false if it was already a member.
    pub fn join(&self, channel: &RoomChannel, conn: &Arc<Connection>) -> bool {
        let added = channel.insert(conn);
        if added {
            let _ = conn.track_room(channel.room_id());
        }
        added
    }

    /// Remove a connection from one room and drop the room if it went idle.
    pub fn leave(&self, room: &RoomId, id: &ConnectionId) -> bool {
        let removed = self
            .existing(room)
            .map(|channel| channel.remove(id))
            .unwrap_or(false);
        self.prune(room);
        removed
    }

    /// Broadcast to everyone in `room`. A room nobody joined yields zero deliveries.
    pub fn broadcast(&self, room: &RoomId, event: &ServerEvent) -> usize {
        self.existing(room).map_or(0, |channel| channel.broadcast(event))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn member_count(&self, room: &RoomId) -> usize {
        self.existing(room).map_or(0, |channel| channel.member_count())
    }

    /// Drop every room and every membership.
    pub fn clear(&self) {
        self.rooms.clear();
    }

    /// Remove an empty room nobody else holds. The strong-count check runs
    /// under the shard lock, so a concurrent `channel()` cannot hand out a
    /// second lane for the same room.
    fn prune(&self, room: &RoomId) {
        let _ = self
            .rooms
            .remove_if(room, |_, channel| {
                Arc::strong_count(channel) == 1 && channel.member_count() == 0
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use roomsync_core::{Identity, Interaction};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn room(id: &str) -> RoomId {
        RoomId::parse(id).unwrap()
    }

    fn conn(name: &str) -> (Arc<Connection>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(16);
        let conn = Connection::new(ConnectionId::new(), Identity::new(name), tx, CancellationToken::new());
        (Arc::new(conn), rx)
    }

    fn interaction(room_id: &str) -> ServerEvent {
        ServerEvent::Interacted(Interaction {
            room_id: room(room_id),
            subject_id: "btn-1".into(),
            actor_identity: "alice".into(),
            timestamp: Utc::now(),
        })
    }

    #[test]
    fn join_is_idempotent() {
        let router = BroadcastRouter::new();
        let (c1, mut rx1) = conn("alice");
        let channel = router.channel(&room("r1"));
        assert!(router.join(&channel, &c1));
        assert!(!router.join(&channel, &c1));
        assert!(channel.is_member(&c1.id));
        drop(channel);

        assert_eq!(router.broadcast(&room("r1"), &interaction("r1")), 1);
        assert!(rx1.try_recv().is_ok());
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn broadcast_only_reaches_room_members() {
        let router = BroadcastRouter::new();
        let (a, mut rx_a) = conn("a");
        let (b, mut rx_b) = conn("b");
        router.join(&router.channel(&room("r1")), &a);
        router.join(&router.channel(&room("r2")), &b);

        assert_eq!(router.broadcast(&room("r1"), &interaction("r1")), 1);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn broadcast_to_unknown_room_is_noop() {
        let router = BroadcastRouter::new();
        assert_eq!(router.broadcast(&room("nobody"), &interaction("nobody")), 0);
        assert_eq!(router.room_count(), 0);
    }

    #[test]
    fn dead_member_does_not_block_others() {
        let router = BroadcastRouter::new();
        let (dead, dead_rx) = conn("dead");
        let (live, mut live_rx) = conn("live");
        let channel = router.channel(&room("r1"));
        router.join(&channel, &dead);
        router.join(&channel, &live);
        drop(dead_rx);

        assert_eq!(channel.broadcast(&interaction("r1")), 1);
        assert!(live_rx.try_recv().is_ok());
    }

    #[test]
    fn leave_prunes_idle_room() {
        let router = BroadcastRouter::new();
        let (a, _rx) = conn("a");
        router.join(&router.channel(&room("r1")), &a);
        assert_eq!(router.room_count(), 1);

        assert!(router.leave(&room("r1"), &a.id));
        assert_eq!(router.room_count(), 0);
        assert!(!router.leave(&room("r1"), &a.id));
    }

    #[test]
    fn leave_keeps_room_while_a_lane_is_held() {
        let router = BroadcastRouter::new();
        let (a, _rx) = conn("a");
        let held = router.channel(&room("r1"));
        router.join(&held, &a);

        router.leave(&room("r1"), &a.id);
        assert_eq!(router.room_count(), 1);
        assert!(Arc::ptr_eq(&held, &router.channel(&room("r1"))));
    }

    #[test]
    fn release_prunes_unjoined_room() {
        let router = BroadcastRouter::new();
        let channel = router.channel(&room("r1"));
        assert_eq!(router.room_count(), 1);
        router.release(channel);
        assert_eq!(router.room_count(), 0);
    }

    #[test]
    fn clear_drops_everything() {
        let router = BroadcastRouter::new();
        let (a, _rx) = conn("a");
        router.join(&router.channel(&room("r1")), &a);
        router.join(&router.channel(&room("r2")), &a);
        router.clear();
        assert_eq!(router.room_count(), 0);
        assert_eq!(router.member_count(&room("r1")), 0);
    }
}
