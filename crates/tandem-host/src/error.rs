//! Error types for host-service operations.

use thiserror::Error;

/// Errors surfaced by the host-service seams.
///
/// All of these are recoverable from the sync core's point of view: a failed
/// buffer edit or replica transaction is absorbed, logged, and the pipeline
/// moves on with current state.
#[derive(Error, Debug)]
pub enum HostError {
    /// The target buffer was closed while an edit was in flight.
    #[error("buffer closed")]
    BufferClosed,

    /// An edit range does not fit the buffer's current content.
    #[error("range {start}..{end} out of bounds for length {len}")]
    RangeOutOfBounds { start: usize, end: usize, len: usize },

    /// A text op's offset does not fit the replicated document.
    #[error("offset {offset} out of bounds for length {len}")]
    OffsetOutOfBounds { offset: usize, len: usize },
}
