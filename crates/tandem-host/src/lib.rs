//! Host-service abstractions for Tandem.
//!
//! The sync core in `tandem-collab` is glue between three services it does
//! not own: a replicated text document (the CRDT), a realtime session channel
//! (presence + membership), and the host editor's buffer/view surface. This
//! crate defines those seams as traits and ships in-process reference
//! implementations (`MemoryReplica`, `LoopbackRoom`, `MemoryHost`) that the
//! core is developed and tested against.
//!
//! The reference implementations are deliberately not CRDTs: they are
//! single-process, last-write-wins stand-ins that honor the same observable
//! contract (atomic origin-tagged transactions, one notification per
//! transaction, others-snapshots per presence change). Convergence under
//! true concurrent merging is the real service's job.

pub mod buffer;
pub mod editor;
pub mod error;
pub mod origin;
pub mod replica;
pub mod room;

pub use buffer::{BufferChanged, EditableBuffer, MemoryBuffer};
pub use editor::{
    DecorationId, EditorEvent, EditorHost, EditorId, EditorSurface, LineMarker, MemoryEditor,
    MemoryHost,
};
pub use error::HostError;
pub use origin::OriginTag;
pub use replica::{MemoryReplica, ReplicaUpdate, ReplicatedText};
pub use room::{LoopbackChannel, LoopbackRoom, PresenceChannel};

/// Capacity of the broadcast channels behind every subscription seam.
///
/// Receivers that fall further behind than this see a `Lagged` error and
/// must resynchronize from current state; every consumer in tandem-collab
/// treats current state as authoritative, so lag is always recoverable.
pub(crate) const CHANNEL_CAPACITY: usize = 64;
