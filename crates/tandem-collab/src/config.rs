//! Session-level configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{PRESENCE_REFRESH_INTERVAL, SYNC_WAIT_TIMEOUT};

/// Knobs for one collaboration session.
///
/// `display_name` and `cursor_color` ride along in every presence payload;
/// peers fall back to "Anonymous" and the deterministic palette when absent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollabConfig {
    /// Name shown to peers next to this client's cursor.
    pub display_name: Option<String>,
    /// Preferred cursor color (hex), overriding the palette on peers' screens.
    pub cursor_color: Option<String>,
    /// Periodic presence re-publish interval.
    pub presence_interval: Duration,
    /// Bound on waiting for the initial join-sync signal.
    pub sync_timeout: Duration,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            display_name: None,
            cursor_color: None,
            presence_interval: PRESENCE_REFRESH_INTERVAL,
            sync_timeout: SYNC_WAIT_TIMEOUT,
        }
    }
}

impl CollabConfig {
    /// Config with an explicit identity, defaults for the rest.
    pub fn named(display_name: impl Into<String>) -> Self {
        Self { display_name: Some(display_name.into()), ..Self::default() }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CollabConfig::default();
        assert_eq!(config.presence_interval, PRESENCE_REFRESH_INTERVAL);
        assert_eq!(config.sync_timeout, SYNC_WAIT_TIMEOUT);
        assert!(config.display_name.is_none());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = CollabConfig::named("ada");
        let json = serde_json::to_string(&config).unwrap();
        let parsed: CollabConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.display_name.as_deref(), Some("ada"));
        assert_eq!(parsed.presence_interval, config.presence_interval);
    }
}
