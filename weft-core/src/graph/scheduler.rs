//! Flush queue bookkeeping.
//!
//! The scheduler owns the pending set — the deduplicated, insertion-ordered
//! queue of dirty computations awaiting a flush — together with the batching
//! depth and the per-flush operation counter.
//!
//! # Ordering
//!
//! A flush must never execute a computation while one of its dependencies is
//! dirty-but-not-yet-applied. [`Scheduler::next_ready`] therefore selects the
//! first pending computation, in insertion order, none of whose recorded
//! dependency signals is produced by a computation that is itself still
//! pending: producers run before their consumers, which is what makes a
//! diamond-shaped graph settle with every node running exactly once. The scan
//! is re-evaluated against the live pending set on every pop, so work
//! appended mid-flush slots into the same ordering.
//!
//! Insertion order breaks ties, which keeps flush order reproducible across
//! runs.

use indexmap::IndexSet;
use smallvec::SmallVec;

use super::node::{ComputationKey, ComputationState};
use super::DepGraph;

/// Outcome of a [`Scheduler::next_ready`] scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextRun {
    /// Run this computation now.
    Run(ComputationKey),
    /// The pending set drained; the flush is complete.
    Done,
    /// Pending computations remain but every one of them waits on another
    /// pending producer — a production loop.
    Stalled,
}

/// Pending-work and batching state for one runtime.
pub struct Scheduler {
    pending: IndexSet<ComputationKey>,
    batch_depth: usize,
    flushing: bool,
    ops: usize,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            pending: IndexSet::new(),
            batch_depth: 0,
            flushing: false,
            ops: 0,
        }
    }

    /// Queue a computation for the next flush. Returns false if it was
    /// already pending (at most one entry per computation per flush).
    pub fn enqueue(&mut self, key: ComputationKey) -> bool {
        self.pending.insert(key)
    }

    /// Drop a computation from the pending set (disposal path).
    pub fn remove(&mut self, key: ComputationKey) {
        self.pending.shift_remove(&key);
    }

    pub fn is_pending(&self, key: ComputationKey) -> bool {
        self.pending.contains(&key)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Select the next computation to run.
    ///
    /// Entries that were disposed or are no longer dirty (a stale memo pulled
    /// fresh by a read, for instance) are discarded silently during the scan.
    pub fn next_ready(&mut self, graph: &DepGraph) -> NextRun {
        let snapshot: SmallVec<[ComputationKey; 8]> = self.pending.iter().copied().collect();

        for key in snapshot {
            let Some(node) = graph.computations.get(key) else {
                self.pending.shift_remove(&key);
                continue;
            };
            if node.state != ComputationState::Dirty {
                self.pending.shift_remove(&key);
                continue;
            }

            let ready = node.dependencies.iter().all(|signal| {
                match graph.signals.get(*signal).and_then(|s| s.owner) {
                    // A self-produced input is not worth waiting on; the
                    // retry bound deals with it.
                    Some(producer) => producer == key || !self.pending.contains(&producer),
                    None => true,
                }
            });

            if ready {
                self.pending.shift_remove(&key);
                return NextRun::Run(key);
            }
        }

        if self.pending.is_empty() {
            NextRun::Done
        } else {
            NextRun::Stalled
        }
    }

    // Batching --------------------------------------------------------------

    pub fn enter_batch(&mut self) -> usize {
        self.batch_depth += 1;
        self.batch_depth
    }

    pub fn exit_batch(&mut self) -> usize {
        self.batch_depth = self.batch_depth.saturating_sub(1);
        self.batch_depth
    }

    pub fn in_batch(&self) -> bool {
        self.batch_depth > 0
    }

    // Flush bookkeeping -----------------------------------------------------

    /// True when an implicit flush should run right now: not batching, not
    /// already flushing, and there is work queued.
    pub fn should_flush(&self) -> bool {
        self.batch_depth == 0 && !self.flushing && self.has_pending()
    }

    /// Mark the flush as started. Returns false if one is already running —
    /// re-entrant writes just feed the flush in progress.
    pub fn begin_flush(&mut self) -> bool {
        if self.flushing {
            return false;
        }
        self.flushing = true;
        self.ops = 0;
        true
    }

    pub fn end_flush(&mut self) {
        self.flushing = false;
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing
    }

    /// Count one executed computation; returns the running total for this
    /// flush.
    pub fn count_op(&mut self) -> usize {
        self.ops += 1;
        self.ops
    }

    pub fn ops(&self) -> usize {
        self.ops
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
