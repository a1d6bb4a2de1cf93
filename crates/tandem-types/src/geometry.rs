//! Editor coordinates: positions and selections.
//!
//! Positions are (line, character) pairs measured in Unicode scalar values,
//! matching what host editors report for cursors. Nothing here validates
//! against a concrete document — peers can and do report positions the local
//! buffer has already shifted out from under; clamping and validation happen
//! at render time.

use serde::{Deserialize, Serialize};

/// A (line, character) coordinate in an editor buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// An anchor/active pair describing a selection range.
///
/// `anchor` is where the selection started; `active` is where the cursor is.
/// The active end may precede the anchor (backwards selection).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Position,
    pub active: Position,
}

impl Selection {
    pub fn new(anchor: Position, active: Position) -> Self {
        Self { anchor, active }
    }

    /// A zero-width selection (caret only) at `pos`.
    pub fn caret(pos: Position) -> Self {
        Self { anchor: pos, active: pos }
    }

    /// True when anchor and active coincide — a bare cursor, not a range.
    pub fn is_empty(&self) -> bool {
        self.anchor == self.active
    }

    /// The earlier of the two endpoints in document order.
    pub fn start(&self) -> Position {
        self.anchor.min(self.active)
    }

    /// The later of the two endpoints in document order.
    pub fn end(&self) -> Position {
        self.anchor.max(self.active)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caret_is_empty() {
        let sel = Selection::caret(Position::new(3, 5));
        assert!(sel.is_empty());
        assert_eq!(sel.start(), sel.end());
    }

    #[test]
    fn test_backwards_selection_ordering() {
        let sel = Selection::new(Position::new(5, 0), Position::new(2, 3));
        assert!(!sel.is_empty());
        assert_eq!(sel.start(), Position::new(2, 3));
        assert_eq!(sel.end(), Position::new(5, 0));
    }

    #[test]
    fn test_position_ordering_within_line() {
        assert!(Position::new(1, 9) < Position::new(2, 0));
        assert!(Position::new(1, 3) < Position::new(1, 4));
    }
}
