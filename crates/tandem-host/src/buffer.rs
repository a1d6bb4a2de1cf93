//! The editable buffer seam.
//!
//! [`EditableBuffer`] is the sync core's view of the host editor's text
//! buffer: read the full text, map between char offsets and (line, character)
//! positions, subscribe to change events, and apply one atomic range
//! replacement. Applying an edit is asynchronous — the host editor decides
//! when (and whether) the edit lands, so `replace` can fail soft when the
//! buffer was closed out from under an in-flight apply.
//!
//! [`MemoryBuffer`] is the in-process reference implementation, with a
//! `close()` switch so tests can exercise the transient-apply-failure path.

use std::ops::Range;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use tandem_types::Position;

use crate::error::HostError;
use crate::CHANNEL_CAPACITY;

/// Notification that the buffer's content changed.
///
/// Carries no payload: handlers read the full current text, which is always
/// at least as new as the event that announced it. Events are emitted for
/// every mutation, including ones the sync binding itself applies — telling
/// those apart is the binding's job, not the buffer's.
#[derive(Clone, Copy, Debug)]
pub struct BufferChanged;

/// The host editor's text buffer, as the sync core sees it.
///
/// Offsets and lengths are measured in Unicode scalar values.
#[async_trait]
pub trait EditableBuffer: Send + Sync {
    /// The buffer's full current text.
    fn text(&self) -> String;

    /// Length in Unicode scalar values.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of lines (an empty buffer has one line).
    fn line_count(&self) -> usize;

    /// Map a char offset to a (line, character) position, clamping past-end
    /// offsets to the end of the buffer.
    fn offset_to_position(&self, offset: usize) -> Position;

    /// Map a (line, character) position to a char offset, clamping
    /// out-of-range lines and characters to what the buffer actually has.
    fn position_to_offset(&self, pos: Position) -> usize;

    /// Subscribe to content-change notifications.
    fn subscribe_changes(&self) -> broadcast::Receiver<BufferChanged>;

    /// Replace `range` (char offsets) with `text` as one atomic edit.
    ///
    /// Fails soft with [`HostError::BufferClosed`] when the buffer is gone.
    async fn replace(&self, range: Range<usize>, text: &str) -> Result<(), HostError>;
}

struct BufferState {
    text: String,
    closed: bool,
}

/// In-process reference buffer.
pub struct MemoryBuffer {
    state: Mutex<BufferState>,
    changes: broadcast::Sender<BufferChanged>,
}

impl MemoryBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        let (changes, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(BufferState { text: text.into(), closed: false }),
            changes,
        }
    }

    /// Simulate the user typing: apply a range replacement and emit a change
    /// event, exactly like [`EditableBuffer::replace`] but synchronous.
    pub fn edit(&self, range: Range<usize>, text: &str) -> Result<(), HostError> {
        self.apply(range, text)
    }

    /// Replace the whole content (test convenience).
    pub fn set_text(&self, text: &str) -> Result<(), HostError> {
        let len = self.len();
        self.apply(0..len, text)
    }

    /// Mark the buffer closed: subsequent edits fail with `BufferClosed`.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    fn apply(&self, range: Range<usize>, text: &str) -> Result<(), HostError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(HostError::BufferClosed);
        }
        let char_len = state.text.chars().count();
        if range.start > range.end || range.end > char_len {
            return Err(HostError::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                len: char_len,
            });
        }
        let start = char_to_byte(&state.text, range.start);
        let end = char_to_byte(&state.text, range.end);
        state.text.replace_range(start..end, text);
        drop(state);

        let _ = self.changes.send(BufferChanged);
        Ok(())
    }
}

#[async_trait]
impl EditableBuffer for MemoryBuffer {
    fn text(&self) -> String {
        self.state.lock().text.clone()
    }

    fn len(&self) -> usize {
        self.state.lock().text.chars().count()
    }

    fn line_count(&self) -> usize {
        // split('\n') yields one segment even for "", matching editors that
        // show an empty document as a single empty line.
        self.state.lock().text.split('\n').count()
    }

    fn offset_to_position(&self, offset: usize) -> Position {
        let state = self.state.lock();
        let mut line = 0u32;
        let mut character = 0u32;
        for (seen, ch) in state.text.chars().enumerate() {
            if seen == offset {
                return Position::new(line, character);
            }
            if ch == '\n' {
                line += 1;
                character = 0;
            } else {
                character += 1;
            }
        }
        Position::new(line, character)
    }

    fn position_to_offset(&self, pos: Position) -> usize {
        let state = self.state.lock();
        let mut offset = 0usize;
        for (idx, text_line) in state.text.split('\n').enumerate() {
            let line_len = text_line.chars().count();
            if idx as u32 == pos.line {
                return offset + line_len.min(pos.character as usize);
            }
            // +1 for the newline this line ends with.
            offset += line_len + 1;
        }
        // Line past the end: clamp to end of buffer.
        state.text.chars().count()
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<BufferChanged> {
        self.changes.subscribe()
    }

    async fn replace(&self, range: Range<usize>, text: &str) -> Result<(), HostError> {
        self.apply(range, text)
    }
}

/// Map a char offset into `s` to the corresponding byte offset.
fn char_to_byte(s: &str, char_offset: usize) -> usize {
    s.char_indices()
        .nth(char_offset)
        .map(|(byte, _)| byte)
        .unwrap_or(s.len())
}

// ============================================================================
// Tests
// ============================================================================
