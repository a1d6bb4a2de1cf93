//! Error types for the collaboration core.

use thiserror::Error;

use tandem_host::HostError;
use tandem_types::DocKey;

/// Errors from session setup and the pre-binding one-shot operations.
///
/// Everything inside a live binding is absorbed and logged instead — a
/// running session never dies from a transient apply failure.
#[derive(Error, Debug)]
pub enum CollabError {
    /// The document a session was asked to collaborate on is not open.
    #[error("document not open: {0}")]
    DocumentNotOpen(DocKey),

    /// A host-service operation failed.
    #[error(transparent)]
    Host(#[from] HostError),
}
