//! The binding registry: at most one live binding per document.
//!
//! Installing a binding for a document that already has one tears the old
//! one down first — synchronously, before the new binding's tasks exist —
//! so two bindings never observe the same buffer. Disposal is idempotent in
//! every direction: guards, `unbind`, and replacement can race without a
//! double-teardown.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use tandem_host::{EditorHost, OriginTag};
use tandem_types::DocKey;

use crate::sync::{spawn_binding, BindTarget, BindingRuntime};

struct BindingEntry {
    id: u64,
    runtime: BindingRuntime,
}

/// Registry of live document bindings for one client.
pub struct BindingRegistry {
    origin: OriginTag,
    bindings: Arc<DashMap<DocKey, BindingEntry>>,
    next_id: AtomicU64,
}

impl BindingRegistry {
    /// A registry whose bindings tag their replica transactions with `origin`.
    pub fn new(origin: OriginTag) -> Self {
        Self {
            origin,
            bindings: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Bind a document to replicated text, replacing (and fully disposing)
    /// any prior binding for the same document first.
    ///
    /// The returned guard removes the registry entry and stops the binding's
    /// tasks; dropping it without calling [`BindingGuard::dispose`] leaves
    /// the binding running (explicit lifecycle, like every other handle in
    /// this crate).
    pub fn bind(&self, target: BindTarget, host: Arc<dyn EditorHost>) -> BindingGuard {
        let doc = target.doc.clone();
        if let Some((_, prior)) = self.bindings.remove(&doc) {
            prior.runtime.dispose();
            info!(%doc, "replaced existing binding");
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let runtime = spawn_binding(target, host, self.origin);
        self.bindings.insert(doc.clone(), BindingEntry { id, runtime });
        debug!(%doc, id, "binding installed");

        BindingGuard {
            doc,
            id,
            bindings: self.bindings.clone(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Dispose the binding for `doc`, if any.
    pub fn unbind(&self, doc: &DocKey) {
        if let Some((_, entry)) = self.bindings.remove(doc) {
            entry.runtime.dispose();
            info!(%doc, "binding removed");
        }
    }

    /// Whether `doc` currently has a live binding.
    pub fn is_bound(&self, doc: &DocKey) -> bool {
        self.bindings.contains_key(doc)
    }

    /// Dispose every binding (process/extension teardown).
    pub fn dispose_all(&self) {
        self.bindings.retain(|doc, entry| {
            entry.runtime.dispose();
            debug!(%doc, "binding removed during teardown");
            false
        });
    }
}

/// Disposer for one installed binding.
pub struct BindingGuard {
    doc: DocKey,
    id: u64,
    bindings: Arc<DashMap<DocKey, BindingEntry>>,
    disposed: AtomicBool,
}

impl BindingGuard {
    /// Stop the binding and drop its registry entry. Idempotent; a guard
    /// whose binding was already replaced or unbound does nothing.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Only remove the entry this guard created — a replacement binding
        // under the same key belongs to a newer guard.
        if let Some((_, entry)) = self
            .bindings
            .remove_if(&self.doc, |_, entry| entry.id == self.id)
        {
            entry.runtime.dispose();
            debug!(doc = %self.doc, id = self.id, "binding disposed via guard");
        }
    }

    pub fn doc(&self) -> &DocKey {
        &self.doc
    }
}

// ============================================================================
// TESTS
// ============================================================================
