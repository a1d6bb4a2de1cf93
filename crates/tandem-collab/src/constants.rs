//! Collaboration configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// How often the local presence payload is re-published while attached,
/// independent of editor events. Keeps peers fresh across events the host
/// editor never reports (e.g. focus churn).
pub const PRESENCE_REFRESH_INTERVAL: Duration = Duration::from_millis(1500);

/// How long a joiner waits for the initial-content sync signal before
/// proceeding with whatever content is currently available. Indefinite
/// blocking would be worse than stale content.
pub const SYNC_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Fallback peer colors, indexed by connection id. Used only when a peer
/// broadcasts no color preference; the same connection always lands on the
/// same palette entry, so peers agree without coordination.
pub const PRESENCE_PALETTE: [&str; 16] = [
    "#e53935", "#d81b60", "#8e24aa", "#5e35b1", "#3949ab", "#1e88e5", "#039be5", "#00acc1",
    "#00897b", "#43a047", "#7cb342", "#c0ca33", "#fdd835", "#ffb300", "#fb8c00", "#f4511e",
];

/// Room id alphabet: lowercase plus digits, with the lookalikes
/// (i/l/1, o/0) removed so ids survive being read aloud.
pub const ROOM_ID_CHARSET: &[u8] = b"abcdefghjkmnpqrstuvwxyz23456789";

/// Length of generated room ids.
pub const ROOM_ID_LEN: usize = 8;
