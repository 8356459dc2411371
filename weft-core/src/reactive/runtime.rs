//! Reactive runtime.
//!
//! The runtime is the coordinator that connects signals, memos, and effects.
//! It owns the dependency graph, the tracking context, and the flush
//! scheduler, all behind one exclusive critical section.
//!
//! # How it works
//!
//! 1. Creating a signal, memo, or effect registers a node in the graph.
//!
//! 2. While a computation runs, the tracker credits every signal read to it;
//!    at commit the computation's edges are replaced with exactly what the
//!    run read.
//!
//! 3. A committed write marks each subscriber dirty and queues it. Outside a
//!    batch the write then flushes synchronously; inside a batch (or inside a
//!    running flush) the work joins the flush that is already owed.
//!
//! 4. The flush is a bounded work-queue loop: producers run before their
//!    consumers, every computation runs at most once per settle, and the loop
//!    aborts with [`RuntimeError::CyclicDependency`] instead of spinning.
//!
//! # Locking
//!
//! All graph, tracker, and queue state shares a single `parking_lot::Mutex`
//! so edge updates are atomic with respect to every reader. The lock is never
//! held while host code runs — tasks and equality comparators execute between
//! critical sections, and re-enter through the same public paths as any other
//! caller.

use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::error::{Entity, Result, RuntimeError};
use crate::graph::node::{
    ComputationKey, ComputationNode, ComputationState, SignalKey, SignalNode, Task,
};
use crate::graph::scheduler::{NextRun, Scheduler};
use crate::graph::DepGraph;

use super::context::Tracker;
use super::effect::Effect;
use super::memo::Memo;
use super::signal::{Signal, SignalCell};

/// Tunable limits for one runtime instance.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Consecutive re-runs tolerated for a computation whose own run writes
    /// one of its dependencies. The default of 1 admits a benign
    /// self-stabilizing write-then-settle pattern while rejecting true
    /// cycles.
    pub max_retries: u32,
    /// Upper bound on computations executed by a single flush. Guards
    /// against mutual-production loops that the per-computation retry
    /// counter cannot see.
    pub max_flush_ops: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            max_flush_ops: 10_000,
        }
    }
}

/// A reactive runtime instance.
///
/// Runtimes are fully independent: each owns its graph, tracker, and queue,
/// and two instances never observe each other's writes or flushes. Handles
/// (`Signal`, `Memo`, `Effect`) stay valid while the runtime they came from
/// is alive.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let count = rt.create_signal(0);
///
/// let count_in_effect = count.clone();
/// rt.create_effect(move || {
///     println!("count is {}", count_in_effect.get()?);
///     Ok(())
/// })?;
///
/// count.set(5)?; // the effect re-runs before `set` returns
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    state: Mutex<RuntimeState>,
}

struct RuntimeState {
    graph: DepGraph,
    tracker: Tracker,
    scheduler: Scheduler,
}

impl RuntimeState {
    fn new() -> Self {
        Self {
            graph: DepGraph::new(),
            tracker: Tracker::new(),
            scheduler: Scheduler::new(),
        }
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                state: Mutex::new(RuntimeState::new()),
            }),
        }
    }

    /// Create a signal with the default (`PartialEq`) change check.
    pub fn create_signal<T>(&self, initial: T) -> Signal<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        self.create_signal_with(initial, |a: &T, b: &T| a == b)
    }

    /// Create a signal with a custom equality comparator.
    ///
    /// The comparator decides whether a write is a change: return `false`
    /// from every call to make the signal propagate unconditionally.
    pub fn create_signal_with<T, E>(&self, initial: T, equals: E) -> Signal<T>
    where
        T: Clone + Send + Sync + 'static,
        E: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        let cell = Arc::new(SignalCell::new(initial, equals));
        let key = {
            let mut st = self.inner.state.lock();
            st.graph.insert_signal(SignalNode::new(None))
        };
        trace!(?key, "signal created");
        Signal::from_parts(Arc::downgrade(&self.inner), key, cell)
    }

    /// Create an effect: a side-effecting computation re-run whenever a
    /// signal it read changes.
    ///
    /// The closure runs once, synchronously, before this returns, to
    /// establish its initial dependencies. If that first run fails the
    /// effect is torn down and the error returned.
    pub fn create_effect<F>(&self, f: F) -> Result<Effect>
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        let task: Task = Arc::new(f);
        let key = {
            let mut st = self.inner.state.lock();
            st.graph
                .insert_computation(ComputationNode::new(task.clone(), None))
        };
        trace!(?key, "effect created");

        let first_run = self.inner.run_tracked(key, || (task)());
        if let Err(err) = first_run.and_then(|()| self.inner.maybe_flush()) {
            self.teardown_computation(key);
            return Err(err);
        }
        Ok(Effect::from_parts(Arc::downgrade(&self.inner), key))
    }

    /// Create a memo with the default (`PartialEq`) change check on its
    /// output.
    pub fn create_memo<T, F>(&self, f: F) -> Result<Memo<T>>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        self.create_memo_with(f, |a: &T, b: &T| a == b)
    }

    /// Create a memo with a custom equality comparator on its output.
    ///
    /// The closure runs once, synchronously, to produce the initial value
    /// and dependencies. Recomputed values equal to the previous one do not
    /// propagate to the memo's own subscribers.
    pub fn create_memo_with<T, F, E>(&self, f: F, equals: E) -> Result<Memo<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Result<T> + Send + Sync + 'static,
        E: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        // Registered with a placeholder task; the real task needs the output
        // cell, which needs the first value.
        let placeholder: Task = Arc::new(|| Ok(()));
        let key = {
            let mut st = self.inner.state.lock();
            st.graph
                .insert_computation(ComputationNode::new(placeholder, None))
        };
        trace!(?key, "memo created");

        let first = {
            let f = f.clone();
            move || (f)()
        };
        let value = match self.inner.run_tracked(key, first) {
            Ok(value) => value,
            Err(err) => {
                self.teardown_computation(key);
                return Err(err);
            }
        };

        let cell = Arc::new(SignalCell::new(value, equals));
        let output = {
            let mut st = self.inner.state.lock();
            let output = st.graph.insert_signal(SignalNode::new(Some(key)));
            let task: Task = {
                let runtime = Arc::downgrade(&self.inner);
                let cell = cell.clone();
                let f = f.clone();
                Arc::new(move || {
                    let value = (f)()?;
                    let Some(inner) = runtime.upgrade() else {
                        return Err(RuntimeError::UseAfterDispose {
                            entity: Entity::Runtime,
                        });
                    };
                    inner.commit_memo_value(output, &cell, value);
                    Ok(())
                })
            };
            if let Some(node) = st.graph.computations.get_mut(key) {
                node.task = task;
                node.output = Some(output);
            }
            output
        };

        if let Err(err) = self.inner.maybe_flush() {
            self.teardown_computation(key);
            return Err(err);
        }
        Ok(Memo::from_parts(
            Arc::downgrade(&self.inner),
            key,
            output,
            cell,
        ))
    }

    /// Run `f` with writes coalesced: signal state still commits and dirty
    /// work still queues immediately, but the flush happens exactly once,
    /// when the outermost batch ends. Nested batches fold into the outer
    /// one.
    pub fn batch<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        self.inner.state.lock().scheduler.enter_batch();
        let mut guard = BatchGuard {
            inner: &self.inner,
            finished: false,
        };
        let result = f();
        guard.finished = true;
        drop(guard);
        let depth = self.inner.state.lock().scheduler.exit_batch();

        let value = result?;
        if depth == 0 {
            self.inner.maybe_flush()?;
        }
        Ok(value)
    }

    /// Remove a half-built or failing computation and anything it owns.
    fn teardown_computation(&self, key: ComputationKey) {
        let mut st = self.inner.state.lock();
        st.scheduler.remove(key);
        if let Some(node) = st.graph.remove_computation(key) {
            if let Some(output) = node.output {
                st.graph.remove_signal(output);
            }
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Internal engine
// ----------------------------------------------------------------------------

impl RuntimeInner {
    // Reads ------------------------------------------------------------------

    /// Register a read against the innermost tracked computation, if any.
    pub(crate) fn track_signal_read(&self, key: SignalKey) -> Result<()> {
        let mut st = self.state.lock();
        if !st.graph.signals.contains_key(key) {
            return Err(RuntimeError::UseAfterDispose {
                entity: Entity::Signal,
            });
        }
        if let Some(frame) = st.tracker.current_mut() {
            frame.reads.insert(key);
        }
        Ok(())
    }

    /// Liveness check for untracked reads.
    pub(crate) fn check_signal(&self, key: SignalKey) -> Result<()> {
        if self.state.lock().graph.signals.contains_key(key) {
            Ok(())
        } else {
            Err(RuntimeError::UseAfterDispose {
                entity: Entity::Signal,
            })
        }
    }

    // Writes -----------------------------------------------------------------

    /// Full write path for host-facing signals: equality gate, commit,
    /// invalidation, and the implicit flush when no batch or flush is open.
    pub(crate) fn write_signal<T>(
        self: &Arc<Self>,
        key: SignalKey,
        cell: &SignalCell<T>,
        value: T,
    ) -> Result<bool>
    where
        T: Clone + Send + Sync + 'static,
    {
        {
            let st = self.state.lock();
            if !st.graph.signals.contains_key(key) {
                return Err(RuntimeError::UseAfterDispose {
                    entity: Entity::Signal,
                });
            }
        }

        // Equality runs outside the critical section; it is host code.
        let changed = {
            let current = cell.value.read();
            !(cell.equals)(&current, &value)
        };
        if !changed {
            return Ok(false);
        }

        *cell.value.write() = value;
        self.commit_signal_write(key);
        self.maybe_flush()?;
        Ok(true)
    }

    /// Equality-gated write of a memo's output. Never flushes: memo output
    /// commits always happen inside a run, whose flush is already owed.
    pub(crate) fn commit_memo_value<T>(&self, output: SignalKey, cell: &SignalCell<T>, value: T)
    where
        T: Clone + Send + Sync + 'static,
    {
        let changed = {
            let current = cell.value.read();
            !(cell.equals)(&current, &value)
        };
        if !changed {
            trace!(?output, "memo output unchanged");
            return;
        }
        *cell.value.write() = value;
        self.commit_signal_write(output);
    }

    /// Bump the version and invalidate subscribers of a just-written signal.
    fn commit_signal_write(&self, key: SignalKey) {
        let mut st = self.state.lock();
        if let Some(node) = st.graph.signals.get_mut(key) {
            node.version += 1;
        }
        mark_dependents(&mut st, key);
    }

    // Tracked execution ------------------------------------------------------

    /// Run `f` as the body of computation `key`: push a tracking frame,
    /// execute, then commit — replacing the computation's dependency edges
    /// with exactly what the run read.
    ///
    /// On failure the computation keeps its previous edges, is left dirty,
    /// and stays queued for a later flush to retry.
    pub(crate) fn run_tracked<R>(
        self: &Arc<Self>,
        key: ComputationKey,
        f: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        {
            let mut st = self.state.lock();
            let Some(node) = st.graph.computations.get_mut(key) else {
                return Err(RuntimeError::UseAfterDispose {
                    entity: Entity::Computation,
                });
            };
            node.state = ComputationState::Running;
            node.redirtied = false;
            st.tracker.push(key);
        }

        let mut guard = RunGuard {
            inner: self,
            key,
            armed: true,
        };
        let outcome = f();
        guard.armed = false;
        drop(guard);

        self.finish_run(key, outcome)
    }

    /// Commit half of a tracked run: pop the frame, refresh edges, settle the
    /// state machine, and apply the bounded retry rule for runs that dirtied
    /// themselves.
    fn finish_run<R>(&self, key: ComputationKey, outcome: Result<R>) -> Result<R> {
        let mut st = self.state.lock();
        let frame = st.tracker.pop();
        debug_assert!(
            frame.as_ref().map_or(false, |fr| fr.computation == key),
            "tracking frame mismatch"
        );

        let value = match outcome {
            Err(err) => {
                if let Some(node) = st.graph.computations.get_mut(key) {
                    node.state = ComputationState::Dirty;
                    st.scheduler.enqueue(key);
                }
                return Err(err);
            }
            Ok(value) => value,
        };

        let reads = frame.map(|fr| fr.reads).unwrap_or_default();
        st.graph.set_dependencies(key, reads);

        let Some(node) = st.graph.computations.get_mut(key) else {
            return Ok(value);
        };
        node.runs += 1;

        if node.redirtied {
            node.redirtied = false;
            node.retries += 1;
            node.state = ComputationState::Dirty;
            if node.retries > self.config.max_retries {
                node.retries = 0;
                st.scheduler.enqueue(key);
                warn!(?key, "computation re-dirtied itself beyond the retry bound");
                return Err(RuntimeError::CyclicDependency {
                    reason: "computation re-dirtied itself beyond the retry bound",
                });
            }
            trace!(?key, retries = node.retries, "self-dirtied run, retrying");
            st.scheduler.enqueue(key);
        } else {
            node.retries = 0;
            node.state = ComputationState::Clean;
        }
        Ok(value)
    }

    /// Execute one queued computation. Entries disposed or already freshened
    /// since they were queued are skipped.
    fn run_computation(self: &Arc<Self>, key: ComputationKey) -> Result<()> {
        let task = {
            let st = self.state.lock();
            match st.graph.computations.get(key) {
                None => return Ok(()),
                Some(node) if node.state != ComputationState::Dirty => return Ok(()),
                Some(node) => node.task.clone(),
            }
        };
        trace!(?key, "running computation");
        self.run_tracked(key, || (task)())
    }

    /// Make a memo current before its output is read.
    ///
    /// Dirty memos recompute synchronously — this is what keeps a read made
    /// mid-batch, or a dependency taken for the first time mid-flush, from
    /// observing a stale value. Reading a memo's output while that memo is
    /// itself running means the memo (directly or through other
    /// computations) consumes itself.
    pub(crate) fn ensure_fresh(self: &Arc<Self>, key: ComputationKey) -> Result<()> {
        let state = {
            let st = self.state.lock();
            match st.graph.computations.get(key) {
                None => return Ok(()),
                Some(node) => node.state,
            }
        };
        match state {
            ComputationState::Clean => Ok(()),
            ComputationState::Dirty => {
                trace!(?key, "recomputing stale memo on read");
                self.run_computation(key)
            }
            ComputationState::Running => Err(RuntimeError::CyclicDependency {
                reason: "memo output read during its own recomputation",
            }),
        }
    }

    // Flush ------------------------------------------------------------------

    /// Flush if work is queued and neither a batch nor a flush is open.
    pub(crate) fn maybe_flush(self: &Arc<Self>) -> Result<()> {
        let should = self.state.lock().scheduler.should_flush();
        if should {
            self.flush()
        } else {
            Ok(())
        }
    }

    fn flush(self: &Arc<Self>) -> Result<()> {
        {
            let mut st = self.state.lock();
            if !st.scheduler.begin_flush() {
                return Ok(());
            }
        }
        let guard = FlushGuard { inner: self };
        let result = self.flush_loop();
        drop(guard);

        match &result {
            Ok(ops) => debug!(ops = *ops, "flush finished"),
            Err(err) => warn!(%err, "flush aborted"),
        }
        result.map(|_| ())
    }

    /// The bounded work-queue loop at the heart of the scheduler.
    fn flush_loop(self: &Arc<Self>) -> Result<usize> {
        loop {
            let next = {
                let mut st = self.state.lock();
                let RuntimeState {
                    graph, scheduler, ..
                } = &mut *st;
                scheduler.next_ready(graph)
            };

            let key = match next {
                NextRun::Done => break,
                NextRun::Stalled => {
                    return Err(RuntimeError::CyclicDependency {
                        reason: "pending computations form a production loop",
                    });
                }
                NextRun::Run(key) => key,
            };

            let ops = self.state.lock().scheduler.count_op();
            if ops > self.config.max_flush_ops {
                return Err(RuntimeError::CyclicDependency {
                    reason: "flush exceeded the operation budget",
                });
            }

            self.run_computation(key)?;
        }
        Ok(self.state.lock().scheduler.ops())
    }

    // Disposal ---------------------------------------------------------------

    /// Remove a signal and all edges touching it. Idempotent.
    pub(crate) fn dispose_signal(&self, key: SignalKey) -> Result<()> {
        let mut st = self.state.lock();
        if !st.graph.signals.contains_key(key) {
            return Ok(());
        }
        st.graph.remove_signal(key);
        trace!(?key, "signal disposed");
        Ok(())
    }

    /// Remove a computation, its queue entry, its edges, and (for memos) its
    /// output signal. Idempotent; fails only for a computation disposing
    /// itself mid-run.
    pub(crate) fn dispose_computation(&self, key: ComputationKey) -> Result<()> {
        let mut st = self.state.lock();
        let Some(node) = st.graph.computations.get(key) else {
            return Ok(());
        };
        if node.state == ComputationState::Running {
            return Err(RuntimeError::InvalidState {
                reason: "cannot dispose a computation while it is running",
            });
        }
        let output = node.output;
        st.scheduler.remove(key);
        st.graph.remove_computation(key);
        if let Some(out) = output {
            st.graph.remove_signal(out);
        }
        trace!(?key, "computation disposed");
        Ok(())
    }

    // Introspection ----------------------------------------------------------

    pub(crate) fn signal_alive(&self, key: SignalKey) -> bool {
        self.state.lock().graph.signals.contains_key(key)
    }

    pub(crate) fn computation_alive(&self, key: ComputationKey) -> bool {
        self.state.lock().graph.computations.contains_key(key)
    }

    pub(crate) fn signal_version(&self, key: SignalKey) -> Result<u64> {
        self.state
            .lock()
            .graph
            .signals
            .get(key)
            .map(|node| node.version)
            .ok_or(RuntimeError::UseAfterDispose {
                entity: Entity::Signal,
            })
    }

    pub(crate) fn signal_subscriber_count(&self, key: SignalKey) -> Result<usize> {
        self.state
            .lock()
            .graph
            .signals
            .get(key)
            .map(|node| node.subscribers.len())
            .ok_or(RuntimeError::UseAfterDispose {
                entity: Entity::Signal,
            })
    }

    pub(crate) fn computation_run_count(&self, key: ComputationKey) -> Result<u64> {
        self.state
            .lock()
            .graph
            .computations
            .get(key)
            .map(|node| node.runs)
            .ok_or(RuntimeError::UseAfterDispose {
                entity: Entity::Computation,
            })
    }

    pub(crate) fn computation_dependency_count(&self, key: ComputationKey) -> Result<usize> {
        self.state
            .lock()
            .graph
            .computations
            .get(key)
            .map(|node| node.dependencies.len())
            .ok_or(RuntimeError::UseAfterDispose {
                entity: Entity::Computation,
            })
    }
}

/// Mark every subscriber of `key` dirty and queue it.
///
/// Subscribers are snapshotted first so graph mutation never overlaps the
/// subscriber iteration. A subscriber that is currently running is not
/// queued; its re-dirtied flag feeds the retry rule instead.
fn mark_dependents(st: &mut RuntimeState, key: SignalKey) {
    let subscribers: SmallVec<[ComputationKey; 8]> = match st.graph.signals.get(key) {
        Some(node) => node.subscribers.iter().copied().collect(),
        None => return,
    };

    for comp in subscribers {
        if let Some(node) = st.graph.computations.get_mut(comp) {
            match node.state {
                ComputationState::Running => {
                    trace!(?comp, "write landed on a running computation");
                    node.redirtied = true;
                }
                ComputationState::Clean => {
                    node.state = ComputationState::Dirty;
                    st.scheduler.enqueue(comp);
                }
                ComputationState::Dirty => {
                    st.scheduler.enqueue(comp);
                }
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Guards
// ----------------------------------------------------------------------------

/// Restores tracker and state-machine invariants if a task unwinds.
struct RunGuard<'a> {
    inner: &'a Arc<RuntimeInner>,
    key: ComputationKey,
    armed: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut st = self.inner.state.lock();
        st.tracker.abandon(self.key);
        if let Some(node) = st.graph.computations.get_mut(self.key) {
            node.state = ComputationState::Dirty;
        }
    }
}

/// Clears the flushing flag even if the flush loop unwinds.
struct FlushGuard<'a> {
    inner: &'a Arc<RuntimeInner>,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.inner.state.lock().scheduler.end_flush();
    }
}

/// Unwinds the batch depth if the batch body panics.
struct BatchGuard<'a> {
    inner: &'a Arc<RuntimeInner>,
    finished: bool,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.inner.state.lock().scheduler.exit_batch();
        }
    }
}
