//! Origin tags: who caused a replicated-document transaction.
//!
//! Every transaction against the replicated text carries an [`OriginTag`].
//! The sync binding labels its own writes with its session's tag and uses
//! the tag on incoming update notifications to tell self-echo from genuinely
//! remote changes. Tags are identity-comparison-only: they are never
//! serialized and never equal to a tag from another process.

use uuid::Uuid;

/// Opaque transaction-origin marker.
///
/// Deliberately not `Serialize`: a tag has no meaning outside the process
/// that allocated it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OriginTag(Uuid);

impl OriginTag {
    /// Allocate a fresh, never-before-seen tag.
    pub fn allocate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Debug for OriginTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 8 hex chars are plenty for log correlation.
        write!(f, "OriginTag({})", &self.0.as_simple().to_string()[..8])
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocated_tags_are_distinct() {
        let a = OriginTag::allocate();
        let b = OriginTag::allocate();
        assert_ne!(a, b);
        assert_eq!(a, a);
    }
}
