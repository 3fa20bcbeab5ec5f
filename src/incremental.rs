//! Incremental up-to-date checking.
//!
//! Decides per node whether its artifact can be reused, and tracks the
//! shared cascade state the coordinator mutates while walking the graph:
//! which declaration nodes changed this run (forcing their dependents to
//! rebuild), whether the preamble was rebuilt (which invalidates every
//! subsequent check short-circuit-style), and whether any object was
//! written (gate for the link phase). All three live behind one
//! mutex/atomics pair — contention is a non-issue since the work is
//! dominated by child-process latency, not lock hold time.

use crate::graph::{Graph, NodeId};
use crate::hash::{self, Digest16};
use crate::meta::Meta;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Shared mutable state threaded through a single coordinator run.
#[derive(Default)]
pub struct BuildState {
    updated_nodes: Mutex<HashSet<NodeId>>,
    preamble_updated: AtomicBool,
    objects_updated: AtomicBool,
    failed: AtomicBool,
    messages: Mutex<Vec<String>>,
}

impl BuildState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_preamble_updated(&self) {
        self.preamble_updated.store(true, Ordering::SeqCst);
    }

    pub fn preamble_updated(&self) -> bool {
        self.preamble_updated.load(Ordering::SeqCst)
    }

    pub fn mark_objects_updated(&self) {
        self.objects_updated.store(true, Ordering::SeqCst);
    }

    pub fn objects_updated(&self) -> bool {
        self.objects_updated.load(Ordering::SeqCst)
    }

    /// Inserts `node` into the cascade set if the declaration artifact's
    /// hash actually changed: compares the new `artifact_hash` against the
    /// previous one, and if they differ, marks the node updated so its
    /// dependents rebuild too. A no-op if the hashes match (the known
    /// over-build from decl ASTs carrying source-location blocks applies
    /// upstream of this call, not here — see DESIGN.md).
    pub fn record_if_changed(&self, node: NodeId, prev: Option<Digest16>, new: Digest16) {
        if prev != Some(new) {
            self.updated_nodes.lock().unwrap().insert(node);
        }
    }

    pub fn is_updated(&self, node: NodeId) -> bool {
        self.updated_nodes.lock().unwrap().contains(&node)
    }

    pub fn record_failure(&self, message: impl Into<String>) {
        self.failed.store(true, Ordering::SeqCst);
        self.messages.lock().unwrap().push(message.into());
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

/// Reads the meta at `meta_path` if present, returning `None` for both
/// "absent" and "corrupt" — both cases mean "nothing to compare against",
/// which the caller folds into "not up to date". Any other error (e.g. a
/// permission failure) is not part of that contract, so it's logged rather
/// than silently swallowed the same way.
pub fn read_meta_if_present(meta_path: &Path) -> Option<Meta> {
    match Meta::read(meta_path) {
        Ok(meta) => Some(meta),
        Err(e) if e.is_recoverable_as_stale() => None,
        Err(e) => {
            tracing::warn!(path = %meta_path.display(), error = %e, "unexpected error reading meta, treating as stale");
            None
        }
    }
}

/// The up-to-date predicate for a single node.
///
/// An artifact is up to date iff: the artifact file exists; its meta exists
/// and decodes; the meta's `source_hash` equals the current source's hash;
/// the preamble has not been rebuilt this run; and none of the node's
/// outgoing-edge (dependency) nodes are in `UpdatedNodes`.
pub fn is_up_to_date(
    graph: &Graph,
    node_id: NodeId,
    source_path: &Path,
    artifact_path: &Path,
    meta_path: &Path,
    state: &BuildState,
) -> bool {
    if state.preamble_updated() {
        return false;
    }
    if !artifact_path.exists() {
        return false;
    }
    let Some(meta) = read_meta_if_present(meta_path) else {
        return false;
    };
    let Ok(current_hash) = hash::hash_file(source_path) else {
        return false;
    };
    if meta.source_hash != current_hash {
        return false;
    }
    if let Some(node) = graph.node(node_id) {
        if node.outgoing.iter().any(|dep| state.is_updated(*dep)) {
            return false;
        }
    }
    true
}
