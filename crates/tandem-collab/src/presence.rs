//! Outbound presence: broadcast this client's cursor to the room.
//!
//! One task per session. It republishes the local presence on a fixed
//! interval (so peers whose snapshot channel dropped a message converge
//! anyway) and immediately on every selection or active-editor event. The
//! payload is rebuilt from the first visible editor each time; when no
//! editor shows the shared document, the client broadcasts identity only
//! and peers render nothing for it.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use tandem_host::{EditorHost, EditorSurface, PresenceChannel};
use tandem_types::{DocKey, PresencePayload};

use crate::config::CollabConfig;

/// The periodic + event-driven presence publisher for one session.
pub(crate) struct PresenceBroadcaster;

impl PresenceBroadcaster {
    /// Spawn the broadcast loop. It stops when `cancel` fires; the final
    /// presence state is cleaned up by the channel's own leave, not here.
    pub(crate) fn spawn(
        channel: Arc<dyn PresenceChannel>,
        host: Arc<dyn EditorHost>,
        doc: DocKey,
        config: CollabConfig,
        cancel: CancellationToken,
    ) {
        let mut events = host.subscribe_editor_events();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.presence_interval);
            // First tick fires immediately and doubles as the attach-time
            // broadcast.
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        publish(channel.as_ref(), host.as_ref(), &doc, &config);
                    }
                    event = events.recv() => match event {
                        Ok(event) => {
                            trace!(%doc, ?event, "editor event, republishing presence");
                            publish(channel.as_ref(), host.as_ref(), &doc, &config);
                        }
                        Err(RecvError::Lagged(_)) => {
                            // Only the latest state matters.
                            publish(channel.as_ref(), host.as_ref(), &doc, &config);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            debug!(%doc, "presence broadcaster stopped");
        });
    }
}

/// Build the payload from the first editor showing `doc` and publish it.
fn publish(
    channel: &dyn PresenceChannel,
    host: &dyn EditorHost,
    doc: &DocKey,
    config: &CollabConfig,
) {
    channel.update_presence(local_payload(host, doc, config));
}

/// This client's current presence payload: identity always, cursor and
/// (non-empty) selection only while an editor shows the document.
pub(crate) fn local_payload(
    host: &dyn EditorHost,
    doc: &DocKey,
    config: &CollabConfig,
) -> PresencePayload {
    let mut payload =
        PresencePayload::identity(config.display_name.clone(), config.cursor_color.clone());

    if let Some(editor) = host.visible_editors(doc).into_iter().next() {
        if let Some(cursor) = editor.cursor() {
            payload = payload.with_cursor(cursor);
        }
        if let Some(selection) = editor.selection() {
            payload = payload.with_selection(selection);
        }
    }
    payload
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tandem_host::{EditorEvent, LoopbackRoom, MemoryHost};
    use tandem_types::{PeerPresence, Position, Selection};

    fn config() -> CollabConfig {
        CollabConfig {
            display_name: Some("ada".into()),
            presence_interval: Duration::from_millis(10),
            ..CollabConfig::default()
        }
    }

    async fn latest(rx: &mut tokio::sync::broadcast::Receiver<Vec<PeerPresence>>) -> Vec<PeerPresence> {
        let mut snapshot = rx.recv().await.unwrap();
        while let Ok(next) = rx.try_recv() {
            snapshot = next;
        }
        snapshot
    }

    #[tokio::test]
    async fn test_payload_without_editor_is_identity_only() {
        let host = MemoryHost::new();
        let doc = DocKey::from("file:///a.txt");
        let payload = local_payload(&host, &doc, &config());
        assert_eq!(payload.display_name(), "ada");
        assert!(payload.cursor.is_none());
        assert!(payload.selection.is_none());
    }

    #[tokio::test]
    async fn test_payload_includes_cursor_and_real_selection() {
        let host = MemoryHost::new();
        let doc = DocKey::from("file:///a.txt");
        let editor = host.open_editor(doc.clone());

        editor.set_cursor(Position::new(3, 1));
        let payload = local_payload(&host, &doc, &config());
        assert_eq!(payload.cursor, Some(Position::new(3, 1)));
        assert!(payload.selection.is_none());

        editor.set_selection(Selection::new(Position::new(0, 0), Position::new(1, 2)));
        let payload = local_payload(&host, &doc, &config());
        assert_eq!(payload.cursor, Some(Position::new(1, 2)));
        assert!(payload.selection.is_some());
    }

    #[tokio::test]
    async fn test_broadcaster_publishes_on_editor_events() {
        let host = Arc::new(MemoryHost::new());
        let doc = DocKey::from("file:///a.txt");
        let editor = host.open_editor(doc.clone());
        editor.set_cursor(Position::new(0, 0));

        let room = LoopbackRoom::new();
        let chan: Arc<dyn PresenceChannel> = Arc::new(room.connect(PresencePayload::default()));
        let watcher = room.connect(PresencePayload::default());
        let mut others = watcher.subscribe_others();

        let cancel = CancellationToken::new();
        // Long interval: only events drive publishes after the first tick.
        let config = CollabConfig {
            display_name: Some("ada".into()),
            presence_interval: Duration::from_secs(60),
            ..CollabConfig::default()
        };
        PresenceBroadcaster::spawn(
            chan.clone(),
            host.clone(),
            doc.clone(),
            config,
            cancel.clone(),
        );

        // Attach-time publish from the immediate first tick.
        let snapshot = latest(&mut others).await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].presence.cursor, Some(Position::new(0, 0)));

        editor.set_cursor(Position::new(4, 2));
        host.emit(EditorEvent::SelectionChanged);
        let snapshot = latest(&mut others).await;
        assert_eq!(snapshot[0].presence.cursor, Some(Position::new(4, 2)));
        assert_eq!(snapshot[0].presence.display_name(), "ada");

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_broadcaster_republishes_on_interval() {
        let host = Arc::new(MemoryHost::new());
        let doc = DocKey::from("file:///a.txt");
        let editor = host.open_editor(doc.clone());
        editor.set_cursor(Position::new(1, 1));

        let room = LoopbackRoom::new();
        let chan: Arc<dyn PresenceChannel> = Arc::new(room.connect(PresencePayload::default()));
        let watcher = room.connect(PresencePayload::default());
        let mut others = watcher.subscribe_others();

        let cancel = CancellationToken::new();
        PresenceBroadcaster::spawn(chan.clone(), host.clone(), doc.clone(), config(), cancel.clone());

        // Drain the attach-time publish, then move the cursor without any
        // editor event: the interval alone must pick it up.
        let _ = latest(&mut others).await;
        editor.set_cursor(Position::new(7, 0));

        let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
        loop {
            let snapshot = latest(&mut others).await;
            if snapshot[0].presence.cursor == Some(Position::new(7, 0)) {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "interval republish never arrived");
        }

        cancel.cancel();
    }
}
