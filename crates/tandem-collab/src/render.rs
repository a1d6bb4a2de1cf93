//! Inbound presence: render peer cursors and selections onto editors.
//!
//! The renderer owns one attachment at a time — one document, one room
//! channel. On every "others" snapshot it rebuilds the full overlay from
//! scratch: per visible editor, per peer, a line marker at the peer's
//! (line-clamped) cursor and a highlight over the peer's selection. Every
//! decoration the renderer has ever created for that editor is re-set on
//! every pass, with an explicitly empty range set when its peer vanished or
//! has no cursor — a decoration that is merely left alone keeps its stale
//! overlay on screen.
//!
//! Peers are colored by their own preference when they broadcast one, and
//! otherwise by a palette slot derived from their connection id, so every
//! client renders the same peer in the same color without coordination.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use tandem_host::{
    DecorationId, EditableBuffer, EditorHost, EditorId, EditorSurface, LineMarker,
    PresenceChannel,
};
use tandem_types::{ConnectionId, DocKey, PeerPresence, Position, Selection};

use crate::config::CollabConfig;
use crate::constants::PRESENCE_PALETTE;
use crate::presence::PresenceBroadcaster;

/// Deterministic fallback color for a connection without a preference.
pub fn palette_color(conn: ConnectionId) -> &'static str {
    PRESENCE_PALETTE[conn.raw() as usize % PRESENCE_PALETTE.len()]
}

/// Decoration resources the renderer has created on one editor for one peer.
#[derive(Clone, Copy)]
struct PeerDecorations {
    marker: DecorationId,
    highlight: DecorationId,
}

#[derive(Default)]
struct RenderState {
    peers: Vec<PeerPresence>,
    decorations: HashMap<(EditorId, ConnectionId), PeerDecorations>,
}

struct Attachment {
    doc: DocKey,
    channel: Arc<dyn PresenceChannel>,
    cancel: CancellationToken,
    state: Arc<Mutex<RenderState>>,
}

/// Renders peer presence for the currently attached document and keeps the
/// room informed of the local cursor.
pub struct PresenceRenderer {
    host: Arc<dyn EditorHost>,
    config: CollabConfig,
    attachment: Mutex<Option<Attachment>>,
}

impl PresenceRenderer {
    pub fn new(host: Arc<dyn EditorHost>, config: CollabConfig) -> Self {
        Self { host, config, attachment: Mutex::new(None) }
    }

    /// Attach to a room channel for `doc`: start rendering others and
    /// broadcasting self. Re-attaching first detaches whatever was attached.
    pub fn attach(&self, channel: Arc<dyn PresenceChannel>, doc: DocKey) {
        self.detach();

        let cancel = CancellationToken::new();
        let state = Arc::new(Mutex::new(RenderState::default()));

        spawn_snapshot_listener(
            channel.clone(),
            self.host.clone(),
            doc.clone(),
            state.clone(),
            cancel.clone(),
        );
        PresenceBroadcaster::spawn(
            channel.clone(),
            self.host.clone(),
            doc.clone(),
            self.config.clone(),
            cancel.clone(),
        );

        info!(%doc, conn = %channel.connection_id(), "presence attached");
        *self.attachment.lock() = Some(Attachment { doc, channel, cancel, state });
    }

    /// Stop rendering and broadcasting, and dispose every decoration this
    /// renderer created. Idempotent.
    pub fn detach(&self) {
        let Some(attachment) = self.attachment.lock().take() else {
            return;
        };
        attachment.cancel.cancel();

        let mut state = attachment.state.lock();
        dispose_all(self.host.as_ref(), &attachment.doc, &mut state);
        debug!(doc = %attachment.doc, "presence detached");
    }

    /// Whether a document is currently attached.
    pub fn is_attached(&self) -> bool {
        self.attachment.lock().is_some()
    }

    /// Push the local cursor (and selection, when non-empty) to the room
    /// right now, without waiting for the next editor event or interval.
    pub fn update_local_cursor(&self, cursor: Position, selection: Option<Selection>) {
        let attachment = self.attachment.lock();
        let Some(attachment) = attachment.as_ref() else {
            return;
        };
        let mut payload = crate::presence::local_payload(
            self.host.as_ref(),
            &attachment.doc,
            &self.config,
        )
        .with_cursor(cursor);
        payload.selection = None;
        if let Some(selection) = selection {
            payload = payload.with_selection(selection);
        }
        attachment.channel.update_presence(payload);
    }

    /// Re-render the current peer set (e.g. after a new editor opened on the
    /// attached document).
    pub fn refresh(&self) {
        let attachment = self.attachment.lock();
        let Some(attachment) = attachment.as_ref() else {
            return;
        };
        let mut state = attachment.state.lock();
        render(self.host.as_ref(), &attachment.doc, &mut state);
    }
}

impl Drop for PresenceRenderer {
    fn drop(&mut self) {
        self.detach();
    }
}

fn spawn_snapshot_listener(
    channel: Arc<dyn PresenceChannel>,
    host: Arc<dyn EditorHost>,
    doc: DocKey,
    state: Arc<Mutex<RenderState>>,
    cancel: CancellationToken,
) {
    let mut others = channel.subscribe_others();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                snapshot = others.recv() => match snapshot {
                    Ok(peers) => {
                        trace!(%doc, peers = peers.len(), "presence snapshot");
                        let mut state = state.lock();
                        // A snapshot that raced with detach must not repaint
                        // what detach just disposed.
                        if cancel.is_cancelled() {
                            break;
                        }
                        state.peers = peers;
                        render(host.as_ref(), &doc, &mut state);
                    }
                    Err(RecvError::Lagged(_)) => {
                        // Snapshots are full state; only the next one matters.
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
        trace!(%doc, "presence snapshot listener stopped");
    });
}

/// Rebuild the overlay for every editor showing `doc` from `state.peers`.
fn render(host: &dyn EditorHost, doc: &DocKey, state: &mut RenderState) {
    if state.peers.is_empty() {
        // No peers left: tear the resources down rather than holding empty
        // decorations forever.
        dispose_all(host, doc, state);
        return;
    }

    let line_count = match host.buffer_for(doc) {
        Some(buffer) => buffer.line_count(),
        // Document closed underneath us: nothing to clamp against, nothing
        // visible to draw on.
        None => return,
    };

    for editor in host.visible_editors(doc) {
        let editor_id = editor.id();
        let mut rendered: HashMap<ConnectionId, (Vec<LineMarker>, Vec<Selection>)> =
            HashMap::new();

        for peer in &state.peers {
            let conn = peer.connection_id;
            let mut markers = Vec::new();
            let mut highlights = Vec::new();

            if let Some(cursor) = peer.presence.cursor {
                let line = cursor.line.min(line_count.saturating_sub(1) as u32);
                markers.push(LineMarker {
                    line,
                    label: peer.presence.display_name().to_string(),
                });
            }
            if let Some(selection) = peer.presence.selection {
                // A selection pointing past the end of the document is stale
                // (sent against an older revision); drop it rather than let
                // the editor clamp it into something misleading.
                let in_bounds = (selection.start().line as usize) < line_count
                    && (selection.end().line as usize) < line_count;
                if in_bounds && !selection.is_empty() {
                    highlights.push(selection);
                }
            }

            state.decorations.entry((editor_id, conn)).or_insert_with(|| {
                let color = peer
                    .presence
                    .color
                    .as_deref()
                    .unwrap_or_else(|| palette_color(conn));
                PeerDecorations {
                    marker: editor.create_line_marker(color),
                    highlight: editor.create_selection_highlight(color),
                }
            });
            rendered.insert(conn, (markers, highlights));
        }

        // Every decoration this editor has ever gotten is re-set; absent
        // peers get the explicit empty set that erases their overlay.
        for ((deco_editor, conn), decorations) in state.decorations.iter() {
            if *deco_editor != editor_id {
                continue;
            }
            let (markers, highlights) = rendered.remove(conn).unwrap_or_default();
            editor.set_marker_ranges(decorations.marker, markers);
            editor.set_highlight_ranges(decorations.highlight, highlights);
        }
    }
}

/// Dispose every decoration the renderer created and forget the peer set.
fn dispose_all(host: &dyn EditorHost, doc: &DocKey, state: &mut RenderState) {
    if state.decorations.is_empty() {
        state.peers.clear();
        return;
    }
    let editors: HashMap<EditorId, _> = host
        .visible_editors(doc)
        .into_iter()
        .map(|editor| (editor.id(), editor))
        .collect();
    for ((editor_id, _), decorations) in state.decorations.drain() {
        if let Some(editor) = editors.get(&editor_id) {
            editor.dispose_decoration(decorations.marker);
            editor.dispose_decoration(decorations.highlight);
        }
    }
    state.peers.clear();
}

// ============================================================================
// TESTS
// ============================================================================
