//! Bounded-parallelism task manager.
//!
//! The coordinator's DFS walk needs workers that can themselves submit
//! further work and block waiting for it — a worker processing node `N`
//! fans out one subtask per dependency, waits for all of them, then runs
//! `on_node(N)`. Plain `rayon::scope`/`join` nesting would get us most of
//! this, but reentrant scheduling additionally wants named task ids,
//! `wait_for_tasks` over an arbitrary subset, and an explicit `same_thread`
//! tail-call form to avoid oversubscribing the pool on the last child of a
//! fan-out. "Waits" cooperate with the pool's scheduler (`rayon::yield_now`)
//! rather than parking a worker thread outright, so a worker blocked on a
//! task still queued behind it on the same pool doesn't deadlock. We build
//! that contract on top of a `rayon::ThreadPool`, the same primitive
//! `compile_parallel` (`compile/project.rs`) uses for its own parallel
//! compile step, and that `rls`'s `work_pool.rs` uses for concurrent request
//! handling.

use crate::error::{CpplError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Identifies a task across its lifetime. Opaque; only meaningful for
/// `wait_for_tasks`/`all_successful` lookups against the manager that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

/// Mutable context handed to a running task; its final `successful` value
/// becomes the task's recorded outcome.
pub struct TaskContext {
    pub successful: bool,
}

impl Default for TaskContext {
    fn default() -> Self {
        Self { successful: true }
    }
}

#[derive(Default)]
struct Shared {
    statuses: Mutex<HashMap<TaskId, Option<bool>>>,
    cvar: Condvar,
}

/// A bounded-parallelism worker pool with task ids, subtask support, and a
/// wait-for-set primitive.
pub struct TaskManager {
    pool: rayon::ThreadPool,
    shared: Arc<Shared>,
    next_id: AtomicU64,
}

impl TaskManager {
    /// `jobs` is the total desired parallelism including the calling
    /// (main) thread, which also participates; the pool itself gets
    /// `max(1, jobs - 1)` workers.
    pub fn new(jobs: usize) -> Result<Self> {
        let workers = jobs.saturating_sub(1).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("cppl-build-worker-{i}"))
            .build()
            .map_err(|e| CpplError::SpawnFailed(e.to_string()))?;
        Ok(Self { pool, shared: Arc::new(Shared::default()), next_id: AtomicU64::new(0) })
    }

    fn alloc_id(&self) -> TaskId {
        TaskId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn record_running(&self, id: TaskId) {
        self.shared.statuses.lock().unwrap().insert(id, None);
    }

    fn record_done(&self, id: TaskId, successful: bool) {
        let mut statuses = self.shared.statuses.lock().unwrap();
        statuses.insert(id, Some(successful));
        drop(statuses);
        self.shared.cvar.notify_all();
    }

    fn run_now<F>(&self, id: TaskId, f: F)
    where
        F: FnOnce(&mut TaskContext) + Send + 'static,
    {
        let mut ctx = TaskContext::default();
        f(&mut ctx);
        self.record_done(id, ctx.successful);
    }

    /// Enqueues `f`; never runs on the caller's thread.
    pub fn add_task<F>(&self, f: F) -> TaskId
    where
        F: FnOnce(&mut TaskContext) + Send + 'static,
    {
        let id = self.alloc_id();
        self.record_running(id);
        let shared = self.shared.clone();
        self.pool.spawn(move || {
            let mut ctx = TaskContext::default();
            f(&mut ctx);
            let mut statuses = shared.statuses.lock().unwrap();
            statuses.insert(id, Some(ctx.successful));
            drop(statuses);
            shared.cvar.notify_all();
        });
        id
    }

    /// Forces `f` to run inline on the calling thread. Used as the
    /// tail-call optimization for the last subtask of a fan-out.
    pub fn add_task_same_thread<F>(&self, f: F) -> TaskId
    where
        F: FnOnce(&mut TaskContext) + Send + 'static,
    {
        let id = self.alloc_id();
        self.record_running(id);
        self.run_now(id, f);
        id
    }

    /// Like `add_task`, but if the caller is already running inside this
    /// pool, runs `f` inline instead of enqueuing it. This is what makes
    /// reentrant submission-then-wait safe: a worker that is itself
    /// blocked in `wait_for_tasks` can't also be the one that drains the
    /// queue, so nested work must be able to make progress without relying
    /// on another idle worker.
    pub fn run_task<F>(&self, f: F) -> TaskId
    where
        F: FnOnce(&mut TaskContext) + Send + 'static,
    {
        if rayon::current_thread_index().is_some() {
            self.add_task_same_thread(f)
        } else {
            self.add_task(f)
        }
    }

    /// Blocks until every task in `ids` has finished. From a worker thread
    /// this cooperates with the pool's scheduler (`rayon::yield_now`)
    /// instead of parking, so a worker waiting on a task still queued
    /// behind it on the same pool doesn't deadlock; only a non-worker
    /// caller falls back to a real condvar wait.
    pub fn wait_for_tasks(&self, ids: &[TaskId]) {
        self.wait_until(|statuses| ids.iter().all(|id| matches!(statuses.get(id), Some(Some(_)))));
    }

    /// Blocks until every task submitted so far has finished. Same
    /// cooperate-or-park rule as `wait_for_tasks`.
    pub fn wait_for_all(&self) {
        self.wait_until(|statuses| statuses.values().all(|s| s.is_some()));
    }

    fn wait_until(&self, done: impl Fn(&HashMap<TaskId, Option<bool>>) -> bool) {
        loop {
            if done(&self.shared.statuses.lock().unwrap()) {
                return;
            }
            if rayon::yield_now().is_none() {
                let mut statuses = self.shared.statuses.lock().unwrap();
                while !done(&statuses) {
                    statuses = self.shared.cvar.wait(statuses).unwrap();
                }
                return;
            }
        }
    }

    /// Reduces the outcomes of `ids` to a single boolean; a task that has
    /// not finished yet counts as failed.
    pub fn all_successful(&self, ids: &[TaskId]) -> bool {
        let statuses = self.shared.statuses.lock().unwrap();
        ids.iter().all(|id| matches!(statuses.get(id), Some(Some(true))))
    }

    /// The current worker's identity, or `None` if called from outside any
    /// worker thread of this pool.
    pub fn worker_id(&self) -> Option<usize> {
        rayon::current_thread_index()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn add_task_runs_and_reports_success() {
        let tm = TaskManager::new(4).unwrap();
        let id = tm.add_task(|ctx| ctx.successful = true);
        tm.wait_for_tasks(&[id]);
        assert!(tm.all_successful(&[id]));
    }

    #[test]
    fn failed_task_is_not_successful() {
        let tm = TaskManager::new(4).unwrap();
        let id = tm.add_task(|ctx| ctx.successful = false);
        tm.wait_for_tasks(&[id]);
        assert!(!tm.all_successful(&[id]));
    }

    #[test]
    fn same_thread_task_runs_before_returning() {
        let tm = TaskManager::new(1).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        let id = tm.add_task_same_thread(move |ctx| {
            ran2.fetch_add(1, Ordering::SeqCst);
            ctx.successful = true;
        });
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(tm.all_successful(&[id]));
    }

    #[test]
    fn wait_for_all_waits_out_every_task() {
        let tm = TaskManager::new(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut ids = vec![];
        for _ in 0..20 {
            let counter = counter.clone();
            ids.push(tm.add_task(move |ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                ctx.successful = true;
            }));
        }
        tm.wait_for_all();
        assert_eq!(counter.load(Ordering::SeqCst), 20);
        assert!(tm.all_successful(&ids));
    }

    #[test]
    fn single_worker_fan_out_does_not_deadlock() {
        // With only one pool worker, a task that fans out subtasks and waits on them must still
        // make progress: the last subtask uses the same-thread form.
        let tm = Arc::new(TaskManager::new(1).unwrap());
        let tm2 = tm.clone();
        let outer = tm.add_task(move |ctx| {
            let sub1 = tm2.run_task(|ctx| ctx.successful = true);
            let sub2 = tm2.add_task_same_thread(|ctx| ctx.successful = true);
            tm2.wait_for_tasks(&[sub1, sub2]);
            ctx.successful = tm2.all_successful(&[sub1, sub2]);
        });
        tm.wait_for_tasks(&[outer]);
        assert!(tm.all_successful(&[outer]));
    }

    #[test]
    fn worker_id_is_none_outside_pool() {
        let tm = TaskManager::new(4).unwrap();
        assert_eq!(tm.worker_id(), None);
    }
}
