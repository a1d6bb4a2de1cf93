//! The session-service seam: room membership and the presence channel.
//!
//! [`PresenceChannel`] is one connection's handle into a room's realtime
//! channel: publish your own presence (last-write-wins), observe everyone
//! else's as full snapshots, and await the initial-content sync signal.
//! Membership, auth, and the transport wire format all live behind this
//! trait.
//!
//! [`LoopbackRoom`] is the in-process hub implementation: every connection
//! lives in the same process, which is exactly what the sync core's tests
//! need to stand up two "peers" against one replica.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use tandem_types::{ConnectionId, PeerPresence, PresencePayload};

use crate::CHANNEL_CAPACITY;

/// One connection's handle to a room's realtime presence channel.
#[async_trait]
pub trait PresenceChannel: Send + Sync {
    /// This connection's transport-assigned identifier.
    fn connection_id(&self) -> ConnectionId;

    /// Publish this connection's presence, replacing whatever it published
    /// before (last-write-wins at the transport).
    fn update_presence(&self, payload: PresencePayload);

    /// Subscribe to "others" snapshots: the full presence set of every other
    /// connection, re-sent whenever any of them changes.
    fn subscribe_others(&self) -> broadcast::Receiver<Vec<PeerPresence>>;

    /// Wait for the initial-content sync signal, up to `timeout`.
    ///
    /// Returns whether the signal arrived. A timeout is a soft outcome —
    /// callers proceed with whatever content is currently available.
    async fn wait_synced(&self, timeout: Duration) -> bool;

    /// Leave the room. Idempotent; also runs on drop.
    fn leave(&self);
}

struct Member {
    presence: PresencePayload,
    others_tx: broadcast::Sender<Vec<PeerPresence>>,
}

struct RoomInner {
    members: Mutex<HashMap<ConnectionId, Member>>,
    next_conn: AtomicU64,
    synced_tx: watch::Sender<bool>,
}

impl RoomInner {
    /// Re-send every member its personal others-snapshot (everyone but
    /// itself, ordered by connection id for determinism).
    fn broadcast_others(&self) {
        let members = self.members.lock();
        let mut all: Vec<PeerPresence> = members
            .iter()
            .map(|(conn, member)| PeerPresence {
                connection_id: *conn,
                presence: member.presence.clone(),
            })
            .collect();
        all.sort_by_key(|peer| peer.connection_id);

        for (conn, member) in members.iter() {
            let others: Vec<PeerPresence> = all
                .iter()
                .filter(|peer| peer.connection_id != *conn)
                .cloned()
                .collect();
            let _ = member.others_tx.send(others);
        }
    }
}

/// In-process room hub. Clone-cheap; all clones share the same membership.
#[derive(Clone)]
pub struct LoopbackRoom {
    inner: Arc<RoomInner>,
}

impl LoopbackRoom {
    pub fn new() -> Self {
        let (synced_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(RoomInner {
                members: Mutex::new(HashMap::new()),
                next_conn: AtomicU64::new(1),
                synced_tx,
            }),
        }
    }

    /// Join the room, broadcasting `initial_presence`, and get back this
    /// connection's channel handle.
    pub fn connect(&self, initial_presence: PresencePayload) -> LoopbackChannel {
        let conn = ConnectionId::new(self.inner.next_conn.fetch_add(1, Ordering::SeqCst));
        let (others_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        self.inner.members.lock().insert(
            conn,
            Member { presence: initial_presence, others_tx: others_tx.clone() },
        );
        self.inner.broadcast_others();
        debug!(%conn, "connection joined loopback room");

        LoopbackChannel {
            conn,
            inner: self.inner.clone(),
            others_tx,
            synced_rx: self.inner.synced_tx.subscribe(),
            left: AtomicBool::new(false),
        }
    }

    /// Flip the initial-content sync signal (test and hosting-side control).
    pub fn set_synced(&self, synced: bool) {
        self.inner.synced_tx.send_replace(synced);
    }

    /// Number of live connections.
    pub fn member_count(&self) -> usize {
        self.inner.members.lock().len()
    }
}

impl Default for LoopbackRoom {
    fn default() -> Self {
        Self::new()
    }
}

/// One connection's handle into a [`LoopbackRoom`].
pub struct LoopbackChannel {
    conn: ConnectionId,
    inner: Arc<RoomInner>,
    others_tx: broadcast::Sender<Vec<PeerPresence>>,
    synced_rx: watch::Receiver<bool>,
    left: AtomicBool,
}

#[async_trait]
impl PresenceChannel for LoopbackChannel {
    fn connection_id(&self) -> ConnectionId {
        self.conn
    }

    fn update_presence(&self, payload: PresencePayload) {
        if self.left.load(Ordering::SeqCst) {
            debug!(conn = %self.conn, "presence update after leave, dropping");
            return;
        }
        {
            let mut members = self.inner.members.lock();
            match members.get_mut(&self.conn) {
                Some(member) => member.presence = payload,
                None => return,
            }
        }
        self.inner.broadcast_others();
    }

    fn subscribe_others(&self) -> broadcast::Receiver<Vec<PeerPresence>> {
        self.others_tx.subscribe()
    }

    async fn wait_synced(&self, timeout: Duration) -> bool {
        let mut rx = self.synced_rx.clone();
        if *rx.borrow() {
            return true;
        }
        let waited = tokio::time::timeout(timeout, async {
            while rx.changed().await.is_ok() {
                if *rx.borrow() {
                    return true;
                }
            }
            false
        })
        .await;
        waited.unwrap_or(false)
    }

    fn leave(&self) {
        if self.left.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.members.lock().remove(&self.conn);
        self.inner.broadcast_others();
        debug!(conn = %self.conn, "connection left loopback room");
    }
}

impl Drop for LoopbackChannel {
    fn drop(&mut self) {
        self.leave();
    }
}

// ============================================================================
// Tests
// ============================================================================
