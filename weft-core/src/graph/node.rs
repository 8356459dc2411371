//! Node types stored in the dependency-graph arenas.
//!
//! The graph is bipartite: signal nodes on one side, computation nodes on the
//! other, with edges recorded symmetrically on both. Nodes are pure
//! bookkeeping — a signal's typed value lives in the cell shared by its
//! handles, and a computation's behavior lives in its type-erased task — so
//! the arenas stay homogeneous without trait objects.

use std::sync::Arc;

use indexmap::IndexSet;
use slotmap::new_key_type;

use crate::error::Result;

new_key_type! {
    /// Stable generational key for a signal node.
    pub struct SignalKey;

    /// Stable generational key for a computation node.
    pub struct ComputationKey;
}

/// Type-erased recompute closure stored on a computation node.
///
/// For an effect this is the host's closure verbatim; for a memo it wraps the
/// host's closure together with the equality-gated write of the output
/// signal.
pub(crate) type Task = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Execution state of a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputationState {
    /// Up to date; nothing to do until a dependency changes.
    Clean,
    /// A dependency changed; queued (or about to be queued) for re-run.
    Dirty,
    /// Currently executing. Writes that land on a running computation set its
    /// re-dirtied flag instead of enqueueing it.
    Running,
}

/// Arena entry for a signal.
pub struct SignalNode {
    /// Incremented once per committed value change, never otherwise.
    pub version: u64,
    /// Computations that read this signal during their last completed run.
    /// Insertion-ordered so invalidation is deterministic.
    pub subscribers: IndexSet<ComputationKey>,
    /// The memo computation that produces this signal, if any. Plain signals
    /// have no owner.
    pub owner: Option<ComputationKey>,
}

impl SignalNode {
    pub fn new(owner: Option<ComputationKey>) -> Self {
        Self {
            version: 0,
            subscribers: IndexSet::new(),
            owner,
        }
    }
}

/// Arena entry for a computation (effect or memo).
pub struct ComputationNode {
    pub(crate) task: Task,
    pub state: ComputationState,
    /// Set when one of this computation's dependencies is invalidated while
    /// it is running — i.e. its own run wrote something it reads.
    pub redirtied: bool,
    /// Consecutive re-dirtied re-runs. Cleared on a clean completion.
    pub retries: u32,
    /// Completed runs.
    pub runs: u64,
    /// Signals read during the last completed run. Replaced wholesale at run
    /// commit; never accumulated.
    pub dependencies: IndexSet<SignalKey>,
    /// The owned output signal, present iff this computation is a memo.
    pub output: Option<SignalKey>,
}

impl ComputationNode {
    pub(crate) fn new(task: Task, output: Option<SignalKey>) -> Self {
        Self {
            task,
            state: ComputationState::Dirty,
            redirtied: false,
            retries: 0,
            runs: 0,
            dependencies: IndexSet::new(),
            output,
        }
    }

    pub fn is_memo(&self) -> bool {
        self.output.is_some()
    }
}
