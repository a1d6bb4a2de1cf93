//! Session lifecycle: host or join a room for one document, leave cleanly.
//!
//! A [`CollabSession`] ties the other pieces together for one (room,
//! document) pair: it seeds or adopts the shared content, installs the
//! two-way binding, and attaches presence. `leave` (or drop) tears all of
//! it down in reverse and leaves the room.
//!
//! Hosting and joining differ only at the start:
//!
//! - the **host** pushes its buffer into the replica, but only when the
//!   replica is still empty — a "host" of a room that already has content is
//!   really a late joiner, and overwriting the shared state would destroy
//!   everyone else's work;
//! - a **joiner** waits (bounded) for the initial-content sync signal, then
//!   replaces its buffer with the replica. A sync timeout is soft: the
//!   session proceeds with whatever content is available, and the binding
//!   converges once updates arrive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

use tandem_host::{EditorHost, OriginTag, PresenceChannel};
use tandem_types::{ConnectionId, DocKey, Position, RoomId, Selection};

use crate::config::CollabConfig;
use crate::constants::{ROOM_ID_CHARSET, ROOM_ID_LEN};
use crate::error::CollabError;
use crate::registry::BindingRegistry;
use crate::render::PresenceRenderer;
use crate::sync::{apply_replica_to_buffer, seed_replica_from_buffer, BindTarget};

/// A fresh random room identifier, from an alphabet without lookalike
/// characters so ids survive being read aloud.
pub fn generate_room_id() -> RoomId {
    let mut rng = rand::thread_rng();
    let id: String = (0..ROOM_ID_LEN)
        .map(|_| ROOM_ID_CHARSET[rng.gen_range(0..ROOM_ID_CHARSET.len())] as char)
        .collect();
    RoomId::new(id)
}

/// One live collaboration session: one room connection, one bound document.
pub struct CollabSession {
    doc: DocKey,
    channel: Arc<dyn PresenceChannel>,
    registry: BindingRegistry,
    renderer: PresenceRenderer,
    synced: bool,
    left: AtomicBool,
}

impl CollabSession {
    /// Start a session as the content host: seed the replica from the local
    /// buffer (skipped when the replica already has content), then bind and
    /// attach presence.
    pub fn host(
        editor_host: Arc<dyn EditorHost>,
        channel: Arc<dyn PresenceChannel>,
        target: BindTarget,
        config: CollabConfig,
    ) -> Result<Self, CollabError> {
        ensure_open(editor_host.as_ref(), &target.doc)?;
        let origin = OriginTag::allocate();
        let seeded =
            seed_replica_from_buffer(target.buffer.as_ref(), target.replica.as_ref(), origin)?;
        if !seeded {
            info!(doc = %target.doc, "room already has content, hosting as late joiner");
        }
        Ok(Self::start(editor_host, channel, target, config, origin, true))
    }

    /// Start a session as a joiner: wait (bounded) for the initial sync
    /// signal, adopt the replica's content, then bind and attach presence.
    pub async fn join(
        editor_host: Arc<dyn EditorHost>,
        channel: Arc<dyn PresenceChannel>,
        target: BindTarget,
        config: CollabConfig,
    ) -> Result<Self, CollabError> {
        ensure_open(editor_host.as_ref(), &target.doc)?;
        let synced = channel.wait_synced(config.sync_timeout).await;
        if !synced {
            warn!(
                doc = %target.doc,
                timeout = ?config.sync_timeout,
                "initial sync signal not seen in time, proceeding with available content"
            );
        }
        apply_replica_to_buffer(target.buffer.as_ref(), target.replica.as_ref()).await?;

        let origin = OriginTag::allocate();
        Ok(Self::start(editor_host, channel, target, config, origin, synced))
    }

    fn start(
        editor_host: Arc<dyn EditorHost>,
        channel: Arc<dyn PresenceChannel>,
        target: BindTarget,
        config: CollabConfig,
        origin: OriginTag,
        synced: bool,
    ) -> Self {
        let doc = target.doc.clone();
        let registry = BindingRegistry::new(origin);
        // The registry entry is the binding's owner; leave disposes it.
        let _ = registry.bind(target, editor_host.clone());

        let renderer = PresenceRenderer::new(editor_host, config);
        renderer.attach(channel.clone(), doc.clone());

        info!(%doc, conn = %channel.connection_id(), "session started");
        Self {
            doc,
            channel,
            registry,
            renderer,
            synced,
            left: AtomicBool::new(false),
        }
    }

    /// The document this session shares.
    pub fn doc(&self) -> &DocKey {
        &self.doc
    }

    /// This session's connection in the room.
    pub fn connection_id(&self) -> ConnectionId {
        self.channel.connection_id()
    }

    /// Whether the initial sync signal was observed (always true for the
    /// host; false for a joiner that hit the soft timeout).
    pub fn synced(&self) -> bool {
        self.synced
    }

    /// Whether the session is still live.
    pub fn is_active(&self) -> bool {
        !self.left.load(Ordering::SeqCst)
    }

    /// Broadcast the local cursor (and non-empty selection) immediately.
    pub fn update_local_cursor(&self, cursor: Position, selection: Option<Selection>) {
        self.renderer.update_local_cursor(cursor, selection);
    }

    /// Re-render peer presence, e.g. after a new editor opened on the doc.
    pub fn refresh_presence(&self) {
        self.renderer.refresh();
    }

    /// End the session: stop syncing, clear every peer overlay, leave the
    /// room. Idempotent; also runs on drop.
    pub fn leave(&self) {
        if self.left.swap(true, Ordering::SeqCst) {
            return;
        }
        self.registry.dispose_all();
        self.renderer.detach();
        self.channel.leave();
        info!(doc = %self.doc, "session left");
    }
}

impl Drop for CollabSession {
    fn drop(&mut self) {
        self.leave();
    }
}

/// The remote applier re-resolves the buffer through the editor host on
/// every apply; a session whose document the host does not know about would
/// sync nothing while looking alive. Refuse it up front.
fn ensure_open(editor_host: &dyn EditorHost, doc: &DocKey) -> Result<(), CollabError> {
    if editor_host.buffer_for(doc).is_none() {
        return Err(CollabError::DocumentNotOpen(doc.clone()));
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
