//! The replicated text document seam.
//!
//! [`ReplicatedText`] is the sync core's view of the external CRDT service:
//! read the materialized string, apply an atomic origin-tagged transaction,
//! subscribe to per-transaction update notifications. The merge algorithm
//! itself lives behind this trait and is out of scope here.
//!
//! [`MemoryReplica`] is the in-process reference implementation. It is not a
//! CRDT — concurrent transactions apply in arrival order — but it honors the
//! contract the core depends on: transactions are all-or-nothing, and each
//! successful transaction emits exactly one notification carrying its origin.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::trace;

use tandem_types::TextOp;

use crate::error::HostError;
use crate::origin::OriginTag;
use crate::CHANNEL_CAPACITY;

/// Notification that one transaction was applied to the replicated text.
///
/// Carries only the origin: observers that care about content re-read the
/// materialization, which is always at least as new as this notification.
#[derive(Clone, Copy, Debug)]
pub struct ReplicaUpdate {
    pub origin: OriginTag,
}

/// The external replicated-document service, as the sync core sees it.
pub trait ReplicatedText: Send + Sync {
    /// The current merged document as a string.
    fn materialize(&self) -> String;

    /// Length of the materialized document in Unicode scalar values.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply `ops` as one atomic transaction tagged with `origin`.
    ///
    /// Either every op applies and observers get exactly one notification,
    /// or nothing applies and no notification is sent.
    fn transact(&self, origin: OriginTag, ops: &[TextOp]) -> Result<(), HostError>;

    /// Subscribe to the per-transaction update stream.
    fn subscribe(&self) -> broadcast::Receiver<ReplicaUpdate>;
}

/// In-process reference replica: a string plus an update broadcast.
pub struct MemoryReplica {
    text: Mutex<String>,
    updates: broadcast::Sender<ReplicaUpdate>,
    transactions: AtomicU64,
}

impl MemoryReplica {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            text: Mutex::new(String::new()),
            updates,
            transactions: AtomicU64::new(0),
        }
    }

    /// Total successful transactions so far. Tests use this to assert the
    /// no-op paths really performed zero operations.
    pub fn transaction_count(&self) -> u64 {
        self.transactions.load(Ordering::SeqCst)
    }

    /// Apply one op to `text`, validating char offsets.
    fn apply_op(text: &mut String, op: &TextOp) -> Result<(), HostError> {
        let char_len = text.chars().count();
        match op {
            TextOp::Insert { offset, text: ins } => {
                if *offset > char_len {
                    return Err(HostError::OffsetOutOfBounds { offset: *offset, len: char_len });
                }
                let byte = char_to_byte(text, *offset);
                text.insert_str(byte, ins);
            }
            TextOp::Delete { offset, len } => {
                if offset + len > char_len {
                    return Err(HostError::OffsetOutOfBounds {
                        offset: offset + len,
                        len: char_len,
                    });
                }
                let start = char_to_byte(text, *offset);
                let end = char_to_byte(text, offset + len);
                text.replace_range(start..end, "");
            }
        }
        Ok(())
    }
}

impl Default for MemoryReplica {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicatedText for MemoryReplica {
    fn materialize(&self) -> String {
        self.text.lock().clone()
    }

    fn len(&self) -> usize {
        self.text.lock().chars().count()
    }

    fn transact(&self, origin: OriginTag, ops: &[TextOp]) -> Result<(), HostError> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut guard = self.text.lock();
        // Validate against a working copy so a bad op midway through the
        // transaction leaves the committed text untouched.
        let mut working = guard.clone();
        for op in ops {
            Self::apply_op(&mut working, op)?;
        }
        *guard = working;
        drop(guard);

        self.transactions.fetch_add(1, Ordering::SeqCst);
        trace!(?origin, ops = ops.len(), "replica transaction applied");
        let _ = self.updates.send(ReplicaUpdate { origin });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ReplicaUpdate> {
        self.updates.subscribe()
    }
}

/// Map a char offset into `s` to the corresponding byte offset.
fn char_to_byte(s: &str, char_offset: usize) -> usize {
    s.char_indices()
        .nth(char_offset)
        .map(|(byte, _)| byte)
        .unwrap_or(s.len())
}

// ============================================================================
// Tests
// ============================================================================
