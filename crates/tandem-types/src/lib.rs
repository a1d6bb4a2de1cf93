//! Shared identity, geometry, and presence types for Tandem.
//!
//! This crate is the wire-level foundation: typed IDs, editor coordinates,
//! presence payloads, and replicated-text operations. It has **no internal
//! tandem dependencies** — a pure leaf crate that other crates build on.
//!
//! # Entity-Relationship Overview
//!
//! ```text
//! Room (RoomId) ← one shared editing session
//!     └── carries one replicated document ("content")
//!     └── has connections (ConnectionId, transport-assigned)
//!
//! Connection (ConnectionId) ← one peer, for the life of one connection
//!     └── broadcasts PresencePayload (cursor, selection, name, color)
//!     └── edits the replicated document via TextOp transactions
//!
//! Document (DocKey) ← one locally-open editable buffer
//!     └── bound to the room's replicated text while collaborating
//! ```
//!
//! # Key Types
//!
//! |--------------------|---------------------------------------------|
//! | Type               | Purpose                                     |
//! |--------------------|---------------------------------------------|
//! | [`RoomId`]         | Which shared session                        |
//! | [`ConnectionId`]   | Which peer connection (not reconnect-stable)|
//! | [`DocKey`]         | Which local document a binding targets      |
//! | [`Position`]       | (line, character) editor coordinate         |
//! | [`Selection`]      | Anchor/active pair                          |
//! | [`PresencePayload`]| One peer's broadcast snapshot               |
//! | [`PeerPresence`]   | Payload + its connection                    |
//! | [`TextOp`]         | Replicated-text insert/delete               |

pub mod geometry;
pub mod ids;
pub mod ops;
pub mod presence;

// Re-export primary types at crate root for convenience.
pub use geometry::{Position, Selection};
pub use ids::{ConnectionId, DocKey, RoomId};
pub use ops::TextOp;
pub use presence::{PeerPresence, PresencePayload, ANONYMOUS_NAME};
