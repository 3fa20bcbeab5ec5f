//! Dependency solver.
//!
//! Two responsibilities: computing each node's full transitive dependency
//! list (the declaration artifacts a compile of that node must preload), and
//! driving the DFS walk that the coordinator uses to schedule actual builds
//! — dependencies before dependents, each subtree visited at most once. The
//! last subtask of any fan-out reuses the current worker as a tail call, and
//! every wait on a dependency's completion cooperates with the pool's own
//! scheduler (see `Completion::wait`) rather than parking the thread, so a
//! single-worker pool or a fan-out deeper than the idle worker count still
//! makes progress instead of deadlocking.

use crate::graph::{Graph, NodeId};
use crate::task::{TaskContext, TaskManager};
use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};

/// Returns the deduplicated, DFS-ordered list of nodes transitively reachable
/// from `node`'s outgoing (dependency) edges. `node` itself is not included.
pub fn transitive_deps(graph: &Graph, node: NodeId) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut frontier: Vec<NodeId> =
        graph.node(node).map(|n| n.outgoing.iter().copied().collect()).unwrap_or_default();
    // Reverse so the resulting order visits the first-declared edge first; order otherwise
    // carries no semantic weight beyond within-node dedup.
    frontier.reverse();
    while let Some(n) = frontier.pop() {
        if seen.insert(n) {
            order.push(n);
            if let Some(node) = graph.node(n) {
                let mut next: Vec<NodeId> = node.outgoing.iter().copied().collect();
                next.reverse();
                frontier.extend(next);
            }
        }
    }
    order
}

/// A one-shot completion signal shared between the task that produces a
/// result and every caller waiting on it.
struct Completion {
    state: Mutex<Option<bool>>,
    cvar: Condvar,
}

impl Completion {
    fn new() -> Self {
        Self { state: Mutex::new(None), cvar: Condvar::new() }
    }

    fn finish(&self, ok: bool) {
        let mut state = self.state.lock().unwrap();
        *state = Some(ok);
        drop(state);
        self.cvar.notify_all();
    }

    /// Blocks until `finish` has been called. If the calling thread is a
    /// rayon worker, blocking it on the condvar would starve the pool's own
    /// queue whenever the pending task sits behind it on that same worker —
    /// with one worker, or fan-out deeper than the idle worker count, that's
    /// a deadlock. So on a worker thread we instead cooperate with the
    /// scheduler via `rayon::yield_now`, which runs another queued task
    /// (often the very one we're waiting on) in place of parking; only the
    /// external caller thread (not itself a worker) falls back to a real
    /// condvar wait, which is safe since the pool doesn't need it to drain
    /// anything.
    fn wait(&self) -> bool {
        loop {
            if let Some(ok) = *self.state.lock().unwrap() {
                return ok;
            }
            if rayon::yield_now().is_none() {
                let mut state = self.state.lock().unwrap();
                while state.is_none() {
                    state = self.cvar.wait(state).unwrap();
                }
                return state.unwrap();
            }
        }
    }
}

struct WalkState<F> {
    graph: Arc<Graph>,
    tm: Arc<TaskManager>,
    on_node: F,
    assigned: Mutex<std::collections::HashMap<NodeId, Arc<Completion>>>,
}

fn schedule<F>(state: &Arc<WalkState<F>>, node_id: NodeId, same_thread: bool) -> Arc<Completion>
where
    F: Fn(NodeId) -> bool + Send + Sync + 'static,
{
    let mut guard = state.assigned.lock().unwrap();
    if let Some(existing) = guard.get(&node_id) {
        return existing.clone();
    }
    let completion = Arc::new(Completion::new());
    guard.insert(node_id, completion.clone());
    // Drop the dedup lock before dispatching: `same_thread` work runs synchronously and may
    // recurse back into `schedule` for deeper dependencies, which would deadlock on a
    // still-held std::sync::Mutex.
    drop(guard);

    let state2 = state.clone();
    let completion2 = completion.clone();
    let body = move |ctx: &mut TaskContext| {
        let ok = visit(&state2, node_id);
        completion2.finish(ok);
        ctx.successful = ok;
    };
    if same_thread {
        state.tm.add_task_same_thread(body);
    } else {
        state.tm.add_task(body);
    }
    completion
}

fn visit<F>(state: &Arc<WalkState<F>>, node_id: NodeId) -> bool
where
    F: Fn(NodeId) -> bool + Send + Sync + 'static,
{
    let deps: Vec<NodeId> =
        state.graph.node(node_id).map(|n| n.outgoing.iter().copied().collect()).unwrap_or_default();

    if !deps.is_empty() {
        let last = deps.len() - 1;
        let completions: Vec<Arc<Completion>> = deps
            .iter()
            .enumerate()
            .map(|(i, &dep)| schedule(state, dep, i == last))
            .collect();
        let results: Vec<bool> = completions.iter().map(|c| c.wait()).collect();
        if !results.into_iter().all(|ok| ok) {
            // WalkAborted: a dependency failed, so this node's own child is never invoked.
            return false;
        }
    }

    (state.on_node)(node_id)
}

/// Runs `on_node` over the graph in dependency order, starting from
/// `graph.terminals`: every `on_node(D)` for `D` in a node's outgoing edges
/// completes before that node's own `on_node` runs, and each node's subtree
/// runs at most once across all paths that reach it.
///
/// Returns `false` if any `on_node` call, or any subtask, reported failure.
pub fn dfs_jobs<F>(graph: Arc<Graph>, tm: Arc<TaskManager>, on_node: F) -> bool
where
    F: Fn(NodeId) -> bool + Send + Sync + 'static,
{
    if graph.nodes.is_empty() {
        return true;
    }

    let state = Arc::new(WalkState {
        graph: graph.clone(),
        tm,
        on_node,
        assigned: Mutex::new(std::collections::HashMap::new()),
    });

    let terminals: Vec<NodeId> = graph.terminals.iter().copied().collect();
    let last = terminals.len().saturating_sub(1);
    let completions: Vec<Arc<Completion>> = terminals
        .iter()
        .enumerate()
        .map(|(i, &t)| schedule(&state, t, i == last))
        .collect();

    completions.iter().map(|c| c.wait()).all(|ok| ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::StringPool;
    use crate::record::ParsedImports;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    fn record(id: &str, decl: &[&str]) -> ParsedImports {
        ParsedImports {
            unit_id: id.into(),
            decl_imports: decl.iter().map(|s| s.to_string()).collect(),
            body_imports: vec![],
            is_public: false,
            is_external: false,
        }
    }

    fn chain_graph() -> (Graph, StringPool) {
        // main -> B -> A (ordinary imports), a straight line.
        let pool = StringPool::new();
        let mut records = HashMap::new();
        records.insert("A".to_string(), record("A", &[]));
        records.insert("B".to_string(), record("B", &["A"]));
        records.insert("main".to_string(), record("main", &["B"]));
        let graph = Graph::build(&records, &pool).unwrap();
        (graph, pool)
    }

    #[test]
    fn transitive_deps_of_main_includes_all_ancestors() {
        let (graph, pool) = chain_graph();
        let main_def = graph.def_id(&pool, "main");
        let deps = transitive_deps(&graph, main_def);
        let b_decl = graph.decl_id(&pool, "B");
        let a_decl = graph.decl_id(&pool, "A");
        assert!(deps.contains(&b_decl));
        assert!(deps.contains(&a_decl));
        // dedup within a node: no repeats even though multiple paths can reach A.
        let unique: HashSet<_> = deps.iter().copied().collect();
        assert_eq!(unique.len(), deps.len());
    }

    #[test]
    fn dfs_jobs_visits_dependencies_before_dependents() {
        let (graph, pool) = chain_graph();
        let order = Arc::new(StdMutex::new(Vec::new()));
        let graph = Arc::new(graph);
        let tm = Arc::new(TaskManager::new(4).unwrap());

        let order2 = order.clone();
        let ok = dfs_jobs(graph.clone(), tm, move |id| {
            order2.lock().unwrap().push(id);
            true
        });
        assert!(ok);

        let order = order.lock().unwrap();
        let pos = |id: NodeId| order.iter().position(|&x| x == id).unwrap();
        let a_decl = graph.decl_id(&pool, "A");
        let b_decl = graph.decl_id(&pool, "B");
        let b_def = graph.def_id(&pool, "B");
        let main_def = graph.def_id(&pool, "main");
        assert!(pos(a_decl) < pos(b_decl));
        assert!(pos(b_decl) < pos(b_def));
        assert!(pos(b_def) < pos(main_def));
    }

    #[test]
    fn each_node_visited_exactly_once_even_with_diamond_sharing() {
        // main imports both B and C; B and C both import A. A must run exactly once.
        let pool = StringPool::new();
        let mut records = HashMap::new();
        records.insert("A".to_string(), record("A", &[]));
        records.insert("B".to_string(), record("B", &["A"]));
        records.insert("C".to_string(), record("C", &["A"]));
        records.insert("main".to_string(), record("main", &["B", "C"]));
        let graph = Arc::new(Graph::build(&records, &pool).unwrap());

        let visits = Arc::new(AtomicUsize::new(0));
        let a_decl = graph.decl_id(&pool, "A");
        let tm = Arc::new(TaskManager::new(4).unwrap());
        let visits2 = visits.clone();
        let ok = dfs_jobs(graph.clone(), tm, move |id| {
            if id == a_decl {
                visits2.fetch_add(1, Ordering::SeqCst);
            }
            true
        });
        assert!(ok);
        assert_eq!(visits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failure_aborts_downstream_without_invoking_them() {
        let (graph, pool) = chain_graph();
        let graph = Arc::new(graph);
        let tm = Arc::new(TaskManager::new(4).unwrap());
        let a_decl = graph.decl_id(&pool, "A");
        let invoked_main = Arc::new(AtomicUsize::new(0));
        let invoked_main2 = invoked_main.clone();

        let ok = dfs_jobs(graph.clone(), tm, move |id| {
            if id == a_decl {
                return false;
            }
            if id == graph.def_id(&pool, "main") {
                invoked_main2.fetch_add(1, Ordering::SeqCst);
            }
            true
        });

        assert!(!ok);
        assert_eq!(invoked_main.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn single_worker_diamond_fan_out_does_not_deadlock() {
        // main imports both B and C; B and C both import A. With a single pool worker,
        // one of {main.decl, main.def} runs on the worker and its non-last dependency
        // (B or C) is spawned onto that same one-worker pool — the worker must then be
        // able to make progress on it while "waiting", not park forever.
        let pool = StringPool::new();
        let mut records = HashMap::new();
        records.insert("A".to_string(), record("A", &[]));
        records.insert("B".to_string(), record("B", &["A"]));
        records.insert("C".to_string(), record("C", &["A"]));
        records.insert("main".to_string(), record("main", &["B", "C"]));
        let graph = Arc::new(Graph::build(&records, &pool).unwrap());
        let tm = Arc::new(TaskManager::new(1).unwrap());

        let visited = Arc::new(StdMutex::new(HashSet::new()));
        let visited2 = visited.clone();
        let ok = dfs_jobs(graph.clone(), tm, move |id| {
            visited2.lock().unwrap().insert(id);
            true
        });
        assert!(ok);
        assert_eq!(visited.lock().unwrap().len(), graph.nodes.len());
    }

    #[test]
    fn result_is_stable_across_job_counts() {
        for jobs in [1, 2, 4, 8] {
            let (graph, pool) = chain_graph();
            let graph = Arc::new(graph);
            let tm = Arc::new(TaskManager::new(jobs).unwrap());
            let visited = Arc::new(StdMutex::new(HashSet::new()));
            let visited2 = visited.clone();
            let ok = dfs_jobs(graph.clone(), tm, move |id| {
                visited2.lock().unwrap().insert(id);
                true
            });
            assert!(ok);
            assert_eq!(visited.lock().unwrap().len(), graph.nodes.len());
            let _ = &pool;
        }
    }
}
