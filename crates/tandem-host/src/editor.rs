//! The editor view seam: surfaces, decorations, and editor events.
//!
//! [`EditorSurface`] is one editor view showing one document. The presence
//! renderer owns decoration resources on it: line markers for peer cursors
//! and highlight ranges for peer selections. [`EditorHost`] is the window
//! level — find the live buffer for a document, enumerate the editors
//! currently showing it, and observe selection/active-editor events.
//!
//! [`MemoryHost`] / [`MemoryEditor`] are the in-process reference
//! implementations; they record decoration state so renderer tests can assert
//! that stale overlays really get cleared.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use tandem_types::{DocKey, Position, Selection};

use crate::buffer::{EditableBuffer, MemoryBuffer};
use crate::CHANNEL_CAPACITY;

/// Identity of one editor view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EditorId(u64);

/// Handle to one decoration resource owned by a renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecorationId(u64);

/// A single-line gutter marker with a hover label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineMarker {
    pub line: u32,
    pub label: String,
}

/// Editor-level events the presence broadcaster reacts to.
#[derive(Clone, Copy, Debug)]
pub enum EditorEvent {
    /// The selection (or bare cursor) moved in some editor.
    SelectionChanged,
    /// A different editor became active.
    ActiveEditorChanged,
}

/// One editor view showing one document.
pub trait EditorSurface: Send + Sync {
    fn id(&self) -> EditorId;

    /// The document this view shows.
    fn doc(&self) -> DocKey;

    /// Current cursor position, if the view has one.
    fn cursor(&self) -> Option<Position>;

    /// Current selection, if the view has one.
    fn selection(&self) -> Option<Selection>;

    /// Create a line-marker decoration resource in `color`.
    fn create_line_marker(&self, color: &str) -> DecorationId;

    /// Create a selection-highlight decoration resource in `color`.
    fn create_selection_highlight(&self, color: &str) -> DecorationId;

    /// Set a marker decoration's visible set. An empty `markers` explicitly
    /// erases whatever the decoration showed before.
    fn set_marker_ranges(&self, decoration: DecorationId, markers: Vec<LineMarker>);

    /// Set a highlight decoration's visible set. An empty `ranges` explicitly
    /// erases whatever the decoration showed before.
    fn set_highlight_ranges(&self, decoration: DecorationId, ranges: Vec<Selection>);

    /// Release a decoration resource. Idempotent.
    fn dispose_decoration(&self, decoration: DecorationId);
}

/// The host editor's window level: buffers, views, and view events.
pub trait EditorHost: Send + Sync {
    /// The live buffer for `doc`, or `None` when the document is not open.
    fn buffer_for(&self, doc: &DocKey) -> Option<Arc<dyn EditableBuffer>>;

    /// Every editor currently showing `doc`.
    fn visible_editors(&self, doc: &DocKey) -> Vec<Arc<dyn EditorSurface>>;

    /// Subscribe to selection / active-editor events.
    fn subscribe_editor_events(&self) -> broadcast::Receiver<EditorEvent>;
}

// ============================================================================
// In-process reference implementation
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DecorationKind {
    LineMarker,
    SelectionHighlight,
}

struct DecorationRecord {
    kind: DecorationKind,
    #[allow(dead_code)]
    color: String,
    markers: Vec<LineMarker>,
    highlights: Vec<Selection>,
    disposed: bool,
}

struct EditorState {
    cursor: Option<Position>,
    selection: Option<Selection>,
    decorations: HashMap<DecorationId, DecorationRecord>,
}

/// Reference editor view that records decoration state for assertions.
pub struct MemoryEditor {
    id: EditorId,
    doc: DocKey,
    state: Mutex<EditorState>,
    next_decoration: AtomicU64,
}

impl MemoryEditor {
    fn new(id: EditorId, doc: DocKey) -> Self {
        Self {
            id,
            doc,
            state: Mutex::new(EditorState {
                cursor: None,
                selection: None,
                decorations: HashMap::new(),
            }),
            next_decoration: AtomicU64::new(1),
        }
    }

    /// Move the bare cursor (clears any selection). Pair with
    /// [`MemoryHost::emit`] to drive the presence broadcaster.
    pub fn set_cursor(&self, pos: Position) {
        let mut state = self.state.lock();
        state.cursor = Some(pos);
        state.selection = None;
    }

    /// Set a selection; the cursor follows the active end.
    pub fn set_selection(&self, selection: Selection) {
        let mut state = self.state.lock();
        state.cursor = Some(selection.active);
        state.selection = Some(selection);
    }

    /// The marker set a decoration currently shows, if it exists and is live.
    pub fn marker_ranges(&self, decoration: DecorationId) -> Option<Vec<LineMarker>> {
        let state = self.state.lock();
        state
            .decorations
            .get(&decoration)
            .filter(|record| !record.disposed)
            .map(|record| record.markers.clone())
    }

    /// The highlight set a decoration currently shows, if it exists and is live.
    pub fn highlight_ranges(&self, decoration: DecorationId) -> Option<Vec<Selection>> {
        let state = self.state.lock();
        state
            .decorations
            .get(&decoration)
            .filter(|record| !record.disposed)
            .map(|record| record.highlights.clone())
    }

    /// Current marker sets of every live marker decoration, in creation
    /// order. Lets tests assert on overlay content without tracking ids.
    pub fn marker_sets(&self) -> Vec<Vec<LineMarker>> {
        let state = self.state.lock();
        let mut live: Vec<_> = state
            .decorations
            .iter()
            .filter(|(_, r)| !r.disposed && r.kind == DecorationKind::LineMarker)
            .collect();
        live.sort_by_key(|(id, _)| *id);
        live.into_iter().map(|(_, r)| r.markers.clone()).collect()
    }

    /// Current highlight sets of every live highlight decoration, in
    /// creation order.
    pub fn highlight_sets(&self) -> Vec<Vec<Selection>> {
        let state = self.state.lock();
        let mut live: Vec<_> = state
            .decorations
            .iter()
            .filter(|(_, r)| !r.disposed && r.kind == DecorationKind::SelectionHighlight)
            .collect();
        live.sort_by_key(|(id, _)| *id);
        live.into_iter().map(|(_, r)| r.highlights.clone()).collect()
    }

    /// Whether a decoration has been disposed.
    pub fn decoration_disposed(&self, decoration: DecorationId) -> bool {
        let state = self.state.lock();
        state
            .decorations
            .get(&decoration)
            .map(|record| record.disposed)
            .unwrap_or(false)
    }

    /// Number of live (not disposed) decoration resources.
    pub fn live_decoration_count(&self) -> usize {
        let state = self.state.lock();
        state.decorations.values().filter(|r| !r.disposed).count()
    }

    fn create_decoration(&self, kind: DecorationKind, color: &str) -> DecorationId {
        let id = DecorationId(self.next_decoration.fetch_add(1, Ordering::SeqCst));
        self.state.lock().decorations.insert(
            id,
            DecorationRecord {
                kind,
                color: color.to_string(),
                markers: Vec::new(),
                highlights: Vec::new(),
                disposed: false,
            },
        );
        id
    }
}

impl EditorSurface for MemoryEditor {
    fn id(&self) -> EditorId {
        self.id
    }

    fn doc(&self) -> DocKey {
        self.doc.clone()
    }

    fn cursor(&self) -> Option<Position> {
        self.state.lock().cursor
    }

    fn selection(&self) -> Option<Selection> {
        self.state.lock().selection
    }

    fn create_line_marker(&self, color: &str) -> DecorationId {
        self.create_decoration(DecorationKind::LineMarker, color)
    }

    fn create_selection_highlight(&self, color: &str) -> DecorationId {
        self.create_decoration(DecorationKind::SelectionHighlight, color)
    }

    fn set_marker_ranges(&self, decoration: DecorationId, markers: Vec<LineMarker>) {
        let mut state = self.state.lock();
        if let Some(record) = state.decorations.get_mut(&decoration) {
            if !record.disposed && record.kind == DecorationKind::LineMarker {
                record.markers = markers;
            }
        }
    }

    fn set_highlight_ranges(&self, decoration: DecorationId, ranges: Vec<Selection>) {
        let mut state = self.state.lock();
        if let Some(record) = state.decorations.get_mut(&decoration) {
            if !record.disposed && record.kind == DecorationKind::SelectionHighlight {
                record.highlights = ranges;
            }
        }
    }

    fn dispose_decoration(&self, decoration: DecorationId) {
        let mut state = self.state.lock();
        if let Some(record) = state.decorations.get_mut(&decoration) {
            record.disposed = true;
            record.markers.clear();
            record.highlights.clear();
        }
    }
}

struct HostState {
    buffers: HashMap<DocKey, Arc<MemoryBuffer>>,
    editors: Vec<Arc<MemoryEditor>>,
}

/// Reference window level: owns buffers and editor views.
pub struct MemoryHost {
    state: Mutex<HostState>,
    events: broadcast::Sender<EditorEvent>,
    next_editor: AtomicU64,
}

impl MemoryHost {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(HostState { buffers: HashMap::new(), editors: Vec::new() }),
            events,
            next_editor: AtomicU64::new(1),
        }
    }

    /// Open (or replace) the buffer for `doc` with `text`.
    pub fn open_buffer(&self, doc: DocKey, text: &str) -> Arc<MemoryBuffer> {
        let buffer = Arc::new(MemoryBuffer::new(text));
        self.state.lock().buffers.insert(doc, buffer.clone());
        buffer
    }

    /// Close the document: `buffer_for` returns `None` afterwards.
    pub fn close_buffer(&self, doc: &DocKey) {
        self.state.lock().buffers.remove(doc);
    }

    /// Open an editor view on `doc`.
    pub fn open_editor(&self, doc: DocKey) -> Arc<MemoryEditor> {
        let id = EditorId(self.next_editor.fetch_add(1, Ordering::SeqCst));
        let editor = Arc::new(MemoryEditor::new(id, doc));
        self.state.lock().editors.push(editor.clone());
        editor
    }

    /// Close an editor view.
    pub fn close_editor(&self, id: EditorId) {
        self.state.lock().editors.retain(|editor| editor.id != id);
    }

    /// Emit an editor event (selection moved, active editor changed).
    pub fn emit(&self, event: EditorEvent) {
        let _ = self.events.send(event);
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorHost for MemoryHost {
    fn buffer_for(&self, doc: &DocKey) -> Option<Arc<dyn EditableBuffer>> {
        self.state
            .lock()
            .buffers
            .get(doc)
            .map(|buffer| buffer.clone() as Arc<dyn EditableBuffer>)
    }

    fn visible_editors(&self, doc: &DocKey) -> Vec<Arc<dyn EditorSurface>> {
        self.state
            .lock()
            .editors
            .iter()
            .filter(|editor| &editor.doc == doc)
            .map(|editor| editor.clone() as Arc<dyn EditorSurface>)
            .collect()
    }

    fn subscribe_editor_events(&self) -> broadcast::Receiver<EditorEvent> {
        self.events.subscribe()
    }
}

// ============================================================================
// Tests
// ============================================================================
