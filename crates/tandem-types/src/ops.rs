//! Replicated-text operations.
//!
//! A transaction against the replicated document is an ordered slice of
//! [`TextOp`]s applied atomically. Offsets are measured in Unicode scalar
//! values against the document state *as each op applies* — a
//! `[Delete(0, n), Insert(0, s)]` pair therefore replaces the whole document
//! without observers ever seeing the intermediate empty state as its own
//! notification.

use serde::{Deserialize, Serialize};

/// One insert or delete against replicated text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextOp {
    /// Insert `text` before the character at `offset`.
    Insert { offset: usize, text: String },
    /// Delete `len` characters starting at `offset`.
    Delete { offset: usize, len: usize },
}

impl TextOp {
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::Insert { offset, text: text.into() }
    }

    pub fn delete(offset: usize, len: usize) -> Self {
        Self::Delete { offset, len }
    }

    /// True for ops that cannot change the document (empty insert/delete).
    pub fn is_noop(&self) -> bool {
        match self {
            Self::Insert { text, .. } => text.is_empty(),
            Self::Delete { len, .. } => *len == 0,
        }
    }
}

/// Build the whole-document replacement transaction: delete everything that
/// was there, insert the new text. Empty components are elided, so replacing
/// `""` with `""` yields an empty transaction (callers should skip it).
pub fn replace_all(old_len: usize, new_text: &str) -> Vec<TextOp> {
    let mut ops = Vec::with_capacity(2);
    if old_len > 0 {
        ops.push(TextOp::delete(0, old_len));
    }
    if !new_text.is_empty() {
        ops.push(TextOp::insert(0, new_text));
    }
    ops
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_all_orders_delete_before_insert() {
        let ops = replace_all(3, "abx");
        assert_eq!(ops, vec![TextOp::delete(0, 3), TextOp::insert(0, "abx")]);
    }

    #[test]
    fn test_replace_all_elides_empty_components() {
        assert_eq!(replace_all(0, "hello"), vec![TextOp::insert(0, "hello")]);
        assert_eq!(replace_all(5, ""), vec![TextOp::delete(0, 5)]);
        assert!(replace_all(0, "").is_empty());
    }

    #[test]
    fn test_noop_detection() {
        assert!(TextOp::insert(0, "").is_noop());
        assert!(TextOp::delete(4, 0).is_noop());
        assert!(!TextOp::insert(0, "x").is_noop());
    }
}
