//! Two-way text sync and presence core for Tandem.
//!
//! This crate is the glue between a local editable buffer and a replicated
//! text document shared over a realtime channel, plus the presence layer that
//! turns remote cursor/selection reports into per-peer overlays. The CRDT
//! merge, transport, and editor internals all live behind the seams defined
//! in `tandem-host`; what lives here is the part that must be right to avoid
//! divergence, echo loops, and position-mapping corruption:
//!
//! - [`registry::BindingRegistry`] — at most one live binding per document,
//!   prior binding torn down before a replacement installs.
//! - [`sync`] — the per-document two-way state machine: buffer→replica
//!   propagation with echo suppression, replica→buffer applies strictly
//!   serialized through a per-binding actor loop.
//! - `presence` — publishes the local cursor/selection on editor events and
//!   on a periodic tick.
//! - [`render::PresenceRenderer`] — rebuilds per-peer decoration state from
//!   each "others" snapshot, clamping stale positions and explicitly erasing
//!   overlays for peers that vanished.
//! - [`session::CollabSession`] — join/host/leave lifecycle tying the above
//!   to one room and one document.
//!
//! # Design stance
//!
//! Propagation is whole-buffer resync in both directions: on any divergence
//! the full text replaces the full text, as one atomic transaction or one
//! atomic edit. That is O(document length) per change and deliberately so —
//! it trades throughput on huge documents for immunity to the entire class
//! of incremental offset-mapping bugs, which is the right trade for
//! source-file-sized documents.

pub mod config;
pub mod constants;
pub mod error;
mod presence;
pub mod registry;
pub mod render;
pub mod session;
pub mod sync;

pub use config::CollabConfig;
pub use error::CollabError;
pub use registry::{BindingGuard, BindingRegistry};
pub use render::PresenceRenderer;
pub use session::{generate_room_id, CollabSession};
pub use sync::{apply_replica_to_buffer, seed_replica_from_buffer, BindTarget};
