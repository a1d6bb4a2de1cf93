//! The per-document two-way sync state machine.
//!
//! One binding owns two tasks:
//!
//! - the **local watcher** forwards buffer changes to the replica as one
//!   atomic whole-document transaction (delete all, insert all) tagged with
//!   the local origin, and suppresses changes observed while a remote apply
//!   is in flight so the local echo of a remote edit is never pushed back out;
//! - the **remote applier** consumes replica update notifications, drops the
//!   ones tagged with the local origin (our own echo), and applies the rest
//!   to the buffer as one full-range replace. Applies run strictly one at a
//!   time inside a single actor loop — a second apply computing its range
//!   against a buffer snapshot the first apply already shifted is exactly the
//!   corruption this serialization exists to prevent.
//!
//! Both directions start from a full-text comparison and no-op when the two
//! sides already agree. That equality check also backstops the suppression
//! flag: a change event from our own apply that is delivered only after the
//! flag clears compares equal and produces no transaction.
//!
//! # State machine, per binding
//!
//! ```text
//! +--------+  replica update (foreign origin)   +----------------+
//! |  Idle  | ---------------------------------> | ApplyingRemote |
//! |        | <--------------------------------- | (in_flight > 0)|
//! +--------+        replace settles             +----------------+
//!     |                                               |
//!     | buffer change: push whole text                | buffer change:
//!     | to replica (local origin)                     | suppressed
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use tandem_host::{EditableBuffer, EditorHost, HostError, OriginTag, ReplicatedText};
use tandem_types::ops::replace_all;
use tandem_types::{DocKey, TextOp};

/// Everything a binding connects: one document, its open buffer, and the
/// room's replicated text.
#[derive(Clone)]
pub struct BindTarget {
    pub doc: DocKey,
    pub buffer: Arc<dyn EditableBuffer>,
    pub replica: Arc<dyn ReplicatedText>,
}

/// Handle to one binding's running tasks. Owned by the registry entry.
pub(crate) struct BindingRuntime {
    cancel: CancellationToken,
    #[cfg(test)]
    in_flight: Arc<AtomicUsize>,
}

impl BindingRuntime {
    /// Stop both tasks. Idempotent. An apply already awaiting the editor may
    /// still settle afterwards; its completion only decrements the in-flight
    /// counter, which nothing reads once the binding is gone.
    pub(crate) fn dispose(&self) {
        self.cancel.cancel();
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Spawn the two tasks for one binding.
pub(crate) fn spawn_binding(
    target: BindTarget,
    host: Arc<dyn EditorHost>,
    origin: OriginTag,
) -> BindingRuntime {
    let cancel = CancellationToken::new();
    let in_flight = Arc::new(AtomicUsize::new(0));

    spawn_local_watcher(target.clone(), origin, cancel.clone(), in_flight.clone());
    spawn_remote_applier(target, host, origin, cancel.clone(), in_flight.clone());

    BindingRuntime {
        cancel,
        #[cfg(test)]
        in_flight,
    }
}

// ============================================================================
// Local watcher: buffer -> replica
// ============================================================================

fn spawn_local_watcher(
    target: BindTarget,
    origin: OriginTag,
    cancel: CancellationToken,
    in_flight: Arc<AtomicUsize>,
) {
    let mut changes = target.buffer.subscribe_changes();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = changes.recv() => match event {
                    Ok(_) => push_local(&target, origin, &in_flight),
                    Err(RecvError::Lagged(skipped)) => {
                        // Missed events only matter as "content changed";
                        // current buffer text is still authoritative.
                        debug!(doc = %target.doc, skipped, "buffer events lagged, resyncing from current text");
                        push_local(&target, origin, &in_flight);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
        trace!(doc = %target.doc, "local watcher stopped");
    });
}

/// Propagate the buffer's current text to the replica, unless a remote apply
/// is in flight (the change is then our own echo) or the two sides already
/// agree (empty transactions help nobody).
fn push_local(target: &BindTarget, origin: OriginTag, in_flight: &AtomicUsize) {
    if in_flight.load(Ordering::SeqCst) > 0 {
        trace!(doc = %target.doc, "suppressing local change during remote apply");
        return;
    }

    let new_text = target.buffer.text();
    let current = target.replica.materialize();
    if current == new_text {
        return;
    }

    let ops = replace_all(current.chars().count(), &new_text);
    if let Err(error) = target.replica.transact(origin, &ops) {
        // Replica rejected the transaction; the next change event (or the
        // next remote update) re-converges from current state.
        warn!(doc = %target.doc, %error, "failed to push local change to replica");
    }
}

// ============================================================================
// Remote applier: replica -> buffer
// ============================================================================

fn spawn_remote_applier(
    target: BindTarget,
    host: Arc<dyn EditorHost>,
    origin: OriginTag,
    cancel: CancellationToken,
    in_flight: Arc<AtomicUsize>,
) {
    let mut updates = target.replica.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                update = updates.recv() => match update {
                    Ok(update) if update.origin == origin => {
                        trace!(doc = %target.doc, "ignoring echo of local transaction");
                    }
                    Ok(_) => apply_remote(&target, host.as_ref(), &in_flight).await,
                    Err(RecvError::Lagged(skipped)) => {
                        // Can't know whether the missed updates were ours;
                        // applying current state is idempotent either way.
                        debug!(doc = %target.doc, skipped, "replica updates lagged, applying current state");
                        apply_remote(&target, host.as_ref(), &in_flight).await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
        trace!(doc = %target.doc, "remote applier stopped");
    });
}

/// Apply the replica's current materialization to the live buffer as one
/// full-range replace. Runs only inside the applier loop, so applies are
/// strictly serialized per binding.
async fn apply_remote(target: &BindTarget, host: &dyn EditorHost, in_flight: &AtomicUsize) {
    in_flight.fetch_add(1, Ordering::SeqCst);

    let result = apply_remote_inner(target, host).await;

    // Clear only after the edit settled, success or failure — clearing
    // earlier would re-open the echo window while the edit is still landing.
    in_flight.fetch_sub(1, Ordering::SeqCst);

    if let Err(error) = result {
        // Soft failure (editor closed the buffer mid-apply, etc.): the next
        // update re-converges against whatever buffer is live by then.
        warn!(doc = %target.doc, %error, "remote apply failed, continuing");
    }
}

async fn apply_remote_inner(target: &BindTarget, host: &dyn EditorHost) -> Result<(), HostError> {
    // Re-locate the buffer: the bound document may have closed since.
    let Some(buffer) = host.buffer_for(&target.doc) else {
        debug!(doc = %target.doc, "document not open, skipping remote apply");
        return Ok(());
    };

    let new_text = target.replica.materialize();
    let current = buffer.text();
    if current == new_text {
        return Ok(());
    }

    // Full range of the buffer's *current* text, not any earlier snapshot.
    let len = current.chars().count();
    buffer.replace(0..len, &new_text).await
}

// ============================================================================
// One-shot operations (no binding required)
// ============================================================================

/// Seed an empty replica from a non-empty buffer, as one local-origin insert.
///
/// Used once when creating a brand-new shared session, so a host's existing
/// content becomes the room's initial state. Never touches a replica that
/// already has content — re-seeding into a live session would destroy peer
/// contributions.
///
/// Returns whether a seed transaction was performed.
pub fn seed_replica_from_buffer(
    buffer: &dyn EditableBuffer,
    replica: &dyn ReplicatedText,
    origin: OriginTag,
) -> Result<bool, HostError> {
    if !replica.is_empty() {
        debug!("replica already has content, not seeding");
        return Ok(false);
    }
    let text = buffer.text();
    if text.is_empty() {
        return Ok(false);
    }

    replica.transact(origin, &[TextOp::insert(0, text.as_str())])?;
    info!(chars = text.chars().count(), "seeded replica from buffer");
    Ok(true)
}

/// One-shot replica→buffer apply, for use *before* a binding exists (e.g.
/// right after joining, to load the room's content into the fresh buffer).
///
/// Returns whether an edit was performed.
pub async fn apply_replica_to_buffer(
    buffer: &dyn EditableBuffer,
    replica: &dyn ReplicatedText,
) -> Result<bool, HostError> {
    let new_text = replica.materialize();
    let current = buffer.text();
    if current == new_text {
        return Ok(false);
    }
    let len = current.chars().count();
    buffer.replace(0..len, &new_text).await?;
    Ok(true)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::broadcast;

    use tandem_host::{
        BufferChanged, EditorEvent, EditorSurface, MemoryBuffer, MemoryHost, MemoryReplica,
    };
    use tandem_types::Position;

    /// Poll until `f` holds, or fail the test.
    async fn eventually(what: &str, f: impl Fn() -> bool) {
        for _ in 0..500 {
            if f() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("condition not reached: {what}");
    }

    /// Let in-flight tasks drain so "nothing else happened" assertions hold.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    struct Fixture {
        doc: DocKey,
        host: Arc<MemoryHost>,
        buffer: Arc<MemoryBuffer>,
        replica: Arc<MemoryReplica>,
        local: OriginTag,
        peer: OriginTag,
    }

    fn fixture(buffer_text: &str, replica_text: &str) -> Fixture {
        let doc = DocKey::from("file:///shared.txt");
        let host = Arc::new(MemoryHost::new());
        let buffer = host.open_buffer(doc.clone(), buffer_text);
        let replica = Arc::new(MemoryReplica::new());
        let peer = OriginTag::allocate();
        if !replica_text.is_empty() {
            replica
                .transact(peer, &[TextOp::insert(0, replica_text)])
                .expect("seed replica");
        }
        Fixture { doc, host, buffer, replica, local: OriginTag::allocate(), peer }
    }

    fn bind(fx: &Fixture) -> BindingRuntime {
        spawn_binding(
            BindTarget {
                doc: fx.doc.clone(),
                buffer: fx.buffer.clone(),
                replica: fx.replica.clone(),
            },
            fx.host.clone(),
            fx.local,
        )
    }

    // ── Seed / one-shot ─────────────────────────────────────────────────

    #[tokio::test]
    async fn test_seed_noop_when_both_empty() {
        let fx = fixture("", "");
        let seeded = seed_replica_from_buffer(fx.buffer.as_ref(), fx.replica.as_ref(), fx.local)
            .unwrap();
        assert!(!seeded);
        assert_eq!(fx.replica.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_seed_inserts_buffer_content() {
        let fx = fixture("hello", "");
        let mut updates = fx.replica.subscribe();

        let seeded = seed_replica_from_buffer(fx.buffer.as_ref(), fx.replica.as_ref(), fx.local)
            .unwrap();

        assert!(seeded);
        assert_eq!(fx.replica.materialize(), "hello");
        assert_eq!(fx.replica.transaction_count(), 1);
        // One transaction, tagged local.
        assert_eq!(updates.recv().await.unwrap().origin, fx.local);
    }

    #[tokio::test]
    async fn test_seed_never_clobbers_existing_session() {
        let fx = fixture("mine", "theirs");
        let seeded = seed_replica_from_buffer(fx.buffer.as_ref(), fx.replica.as_ref(), fx.local)
            .unwrap();
        assert!(!seeded);
        assert_eq!(fx.replica.materialize(), "theirs");
    }

    #[tokio::test]
    async fn test_one_shot_apply_replica_to_buffer() {
        let fx = fixture("", "shared content");
        let edited = apply_replica_to_buffer(fx.buffer.as_ref(), fx.replica.as_ref())
            .await
            .unwrap();
        assert!(edited);
        assert_eq!(fx.buffer.text(), "shared content");

        // Already equal: no edit.
        let edited = apply_replica_to_buffer(fx.buffer.as_ref(), fx.replica.as_ref())
            .await
            .unwrap();
        assert!(!edited);
    }

    // ── Local -> replica ────────────────────────────────────────────────

    #[tokio::test]
    async fn test_local_edit_becomes_one_local_transaction() {
        let fx = fixture("abc", "abc");
        let runtime = bind(&fx);
        let mut updates = fx.replica.subscribe();
        let before = fx.replica.transaction_count();

        fx.buffer.edit(2..3, "x").unwrap();

        eventually("replica converged to abx", || fx.replica.materialize() == "abx").await;
        assert_eq!(fx.replica.transaction_count(), before + 1);
        assert_eq!(updates.recv().await.unwrap().origin, fx.local);
        runtime.dispose();
    }

    #[tokio::test]
    async fn test_local_noop_performs_zero_transactions() {
        let fx = fixture("abc", "abc");
        let runtime = bind(&fx);
        let before = fx.replica.transaction_count();

        // Change event fires but the text already matches the replica.
        fx.buffer.set_text("abc").unwrap();

        settle().await;
        assert_eq!(fx.replica.transaction_count(), before);
        runtime.dispose();
    }

    #[tokio::test]
    async fn test_local_delete_to_empty() {
        let fx = fixture("abc", "abc");
        let runtime = bind(&fx);

        fx.buffer.set_text("").unwrap();

        eventually("replica emptied", || fx.replica.materialize().is_empty()).await;
        runtime.dispose();
    }

    // ── Replica -> local ────────────────────────────────────────────────

    #[tokio::test]
    async fn test_remote_update_replaces_buffer() {
        let fx = fixture("abc", "abc");
        let runtime = bind(&fx);

        fx.replica.transact(fx.peer, &replace_all(3, "abd")).unwrap();

        eventually("buffer converged to abd", || fx.buffer.text() == "abd").await;
        runtime.dispose();
    }

    #[tokio::test]
    async fn test_remote_apply_does_not_echo() {
        let fx = fixture("abc", "abc");
        let runtime = bind(&fx);

        fx.replica.transact(fx.peer, &replace_all(3, "abd")).unwrap();
        eventually("buffer converged", || fx.buffer.text() == "abd").await;

        // The buffer change caused by the apply must not bounce back out as
        // a new transaction: the peer's is the only one.
        settle().await;
        assert_eq!(fx.replica.transaction_count(), 2); // seed + peer edit
        assert_eq!(fx.replica.materialize(), "abd");
        assert_eq!(runtime.in_flight(), 0);
        runtime.dispose();
    }

    #[tokio::test]
    async fn test_local_echo_of_own_transaction_is_ignored() {
        let fx = fixture("abc", "abc");
        let runtime = bind(&fx);

        fx.buffer.edit(2..3, "x").unwrap();
        eventually("replica converged", || fx.replica.materialize() == "abx").await;

        // Our own transaction's update notification must not trigger a
        // remote apply; the buffer keeps its text and sees no extra edit.
        settle().await;
        assert_eq!(fx.buffer.text(), "abx");
        assert_eq!(fx.replica.transaction_count(), 2); // seed + local push
        runtime.dispose();
    }

    #[tokio::test]
    async fn test_remote_apply_skips_when_document_closed() {
        let fx = fixture("abc", "abc");
        let runtime = bind(&fx);

        fx.host.close_buffer(&fx.doc);
        fx.replica.transact(fx.peer, &replace_all(3, "abd")).unwrap();

        // Nothing to update; the binding survives.
        settle().await;
        assert_eq!(fx.buffer.text(), "abc");

        // Reopening the document picks the next update back up.
        let reopened = fx.host.open_buffer(fx.doc.clone(), "abd");
        fx.replica.transact(fx.peer, &replace_all(3, "abde")).unwrap();
        eventually("reopened buffer converged", || reopened.text() == "abde").await;
        runtime.dispose();
    }

    #[tokio::test]
    async fn test_failed_apply_is_soft_and_chain_continues() {
        let fx = fixture("abc", "abc");
        let runtime = bind(&fx);

        fx.buffer.close();
        fx.replica.transact(fx.peer, &replace_all(3, "abd")).unwrap();
        settle().await;
        // Apply failed soft; counter is back to zero, binding still alive.
        assert_eq!(runtime.in_flight(), 0);

        // A later update against a reopened document still lands.
        let reopened = fx.host.open_buffer(fx.doc.clone(), "");
        fx.replica.transact(fx.peer, &replace_all(3, "fresh")).unwrap();
        eventually("chain continued", || reopened.text() == "fresh").await;
        runtime.dispose();
    }

    // ── Serialization of remote applies ─────────────────────────────────

    /// Buffer that sleeps inside `replace` and records how many replaces
    /// overlap, to prove applies never run concurrently.
    struct SlowBuffer {
        inner: MemoryBuffer,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl SlowBuffer {
        fn new(text: &str) -> Self {
            Self {
                inner: MemoryBuffer::new(text),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EditableBuffer for SlowBuffer {
        fn text(&self) -> String {
            self.inner.text()
        }
        fn len(&self) -> usize {
            self.inner.len()
        }
        fn line_count(&self) -> usize {
            self.inner.line_count()
        }
        fn offset_to_position(&self, offset: usize) -> Position {
            self.inner.offset_to_position(offset)
        }
        fn position_to_offset(&self, pos: Position) -> usize {
            self.inner.position_to_offset(pos)
        }
        fn subscribe_changes(&self) -> broadcast::Receiver<BufferChanged> {
            self.inner.subscribe_changes()
        }
        async fn replace(
            &self,
            range: std::ops::Range<usize>,
            text: &str,
        ) -> Result<(), HostError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(15)).await;
            let result = self.inner.replace(range, text).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    /// Host that serves one fixed buffer for one doc.
    struct SlowHost {
        doc: DocKey,
        buffer: Arc<SlowBuffer>,
        events: broadcast::Sender<EditorEvent>,
    }

    impl EditorHost for SlowHost {
        fn buffer_for(&self, doc: &DocKey) -> Option<Arc<dyn EditableBuffer>> {
            (doc == &self.doc).then(|| self.buffer.clone() as Arc<dyn EditableBuffer>)
        }
        fn visible_editors(&self, _doc: &DocKey) -> Vec<Arc<dyn EditorSurface>> {
            Vec::new()
        }
        fn subscribe_editor_events(&self) -> broadcast::Receiver<EditorEvent> {
            self.events.subscribe()
        }
    }

    #[tokio::test]
    async fn test_remote_applies_are_strictly_serialized() {
        let doc = DocKey::from("file:///slow.txt");
        let buffer = Arc::new(SlowBuffer::new("v0"));
        let replica = Arc::new(MemoryReplica::new());
        let peer = OriginTag::allocate();
        replica.transact(peer, &[TextOp::insert(0, "v0")]).unwrap();

        let (events, _) = broadcast::channel(8);
        let host = Arc::new(SlowHost { doc: doc.clone(), buffer: buffer.clone(), events });

        let runtime = spawn_binding(
            BindTarget {
                doc,
                buffer: buffer.clone() as Arc<dyn EditableBuffer>,
                replica: replica.clone(),
            },
            host,
            OriginTag::allocate(),
        );

        // Two updates land before the first (slow) apply can settle.
        replica.transact(peer, &replace_all(2, "v1")).unwrap();
        replica.transact(peer, &replace_all(2, "v2")).unwrap();

        eventually("buffer reached latest materialization", || buffer.text() == "v2").await;
        assert_eq!(
            buffer.max_active.load(Ordering::SeqCst),
            1,
            "two remote applies overlapped"
        );
        runtime.dispose();
    }

    // ── Convergence under mixed traffic ─────────────────────────────────

    #[tokio::test]
    async fn test_convergence_after_interleaved_edits() {
        let fx = fixture("line one\n", "line one\n");
        let runtime = bind(&fx);

        fx.buffer.edit(9..9, "line two\n").unwrap();
        fx.replica
            .transact(fx.peer, &replace_all(fx.replica.len(), "peer rewrite\n"))
            .unwrap();
        fx.buffer.edit(0..0, "> ").unwrap();

        // Once both sides stop mutating, they settle on identical text.
        eventually("buffer and replica converged", || {
            fx.buffer.text() == fx.replica.materialize()
        })
        .await;
        settle().await;
        assert_eq!(fx.buffer.text(), fx.replica.materialize());
        runtime.dispose();
    }

    #[tokio::test]
    async fn test_dispose_stops_propagation() {
        let fx = fixture("abc", "abc");
        let runtime = bind(&fx);
        runtime.dispose();
        runtime.dispose(); // idempotent
        settle().await;

        let count = fx.replica.transaction_count();
        fx.buffer.edit(0..0, "zzz").unwrap();
        fx.replica.transact(fx.peer, &replace_all(3, "xyz")).unwrap();
        settle().await;

        assert_eq!(fx.replica.transaction_count(), count + 1); // only the peer's
        assert_eq!(fx.buffer.text(), "zzzabc");
    }
}
