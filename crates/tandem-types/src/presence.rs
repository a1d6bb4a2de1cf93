//! Presence payloads — ephemeral per-connection state.
//!
//! A [`PresencePayload`] is what one peer broadcasts about itself: cursor,
//! optional selection, optional display name, optional color preference.
//! Nothing here is persisted; the full set of peers is rebuilt from the
//! latest snapshot on every "others changed" notification.

use serde::{Deserialize, Serialize};

use crate::geometry::{Position, Selection};
use crate::ids::ConnectionId;

/// Display name used when a peer broadcasts none.
pub const ANONYMOUS_NAME: &str = "Anonymous";

/// One peer's self-reported presence snapshot.
///
/// All fields are optional: a peer that has not yet placed a cursor, or one
/// that broadcasts only identity, is still a valid peer. The selection field
/// is present only while the peer's selection is non-empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresencePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<Selection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl PresencePayload {
    /// Identity-only payload (no cursor yet) — what a joiner broadcasts
    /// before it has an editor open.
    pub fn identity(name: Option<String>, color: Option<String>) -> Self {
        Self { name, color, ..Self::default() }
    }

    /// The peer's display name, defaulting to [`ANONYMOUS_NAME`].
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => ANONYMOUS_NAME,
        }
    }

    /// Builder-style: set the cursor.
    pub fn with_cursor(mut self, cursor: Position) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Builder-style: set the selection only when it is a real range.
    pub fn with_selection(mut self, selection: Selection) -> Self {
        if !selection.is_empty() {
            self.selection = Some(selection);
        }
        self
    }
}

/// A payload together with the connection that broadcast it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerPresence {
    pub connection_id: ConnectionId,
    pub presence: PresencePayload,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_defaults_to_anonymous() {
        assert_eq!(PresencePayload::default().display_name(), ANONYMOUS_NAME);
        assert_eq!(
            PresencePayload::identity(Some(String::new()), None).display_name(),
            ANONYMOUS_NAME
        );
        assert_eq!(
            PresencePayload::identity(Some("ada".into()), None).display_name(),
            "ada"
        );
    }

    #[test]
    fn test_empty_selection_is_dropped() {
        let payload = PresencePayload::default()
            .with_cursor(Position::new(1, 2))
            .with_selection(Selection::caret(Position::new(1, 2)));
        assert!(payload.selection.is_none());
        assert_eq!(payload.cursor, Some(Position::new(1, 2)));
    }

    #[test]
    fn test_json_omits_absent_fields() {
        let payload = PresencePayload::default().with_cursor(Position::new(0, 4));
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"cursor":{"line":0,"character":4}}"#);
    }

    #[test]
    fn test_json_roundtrip_full_payload() {
        let payload = PresencePayload {
            cursor: Some(Position::new(2, 1)),
            selection: Some(Selection::new(Position::new(2, 0), Position::new(2, 1))),
            name: Some("grace".into()),
            color: Some("#e53935".into()),
        };
        let json = serde_json::to_string(&payload).unwrap();
        let parsed: PresencePayload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, payload);
    }
}
