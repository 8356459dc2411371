//! Dependency-tracking context.
//!
//! While a computation executes, every signal read must be credited to it.
//! The tracker is a stack of frames — one per computation currently executing
//! — owned by the runtime instance. It is deliberately *not* a thread-local
//! or a process global: each runtime carries its own tracker, so independent
//! runtimes can coexist in one process without observing each other.
//!
//! Nesting happens naturally: a stale memo pulled fresh from inside an
//! effect's run pushes an inner frame, and the memo's reads land there, not
//! on the effect.

use indexmap::IndexSet;

use crate::graph::node::{ComputationKey, SignalKey};

/// One tracked execution in progress.
pub(crate) struct Frame {
    pub computation: ComputationKey,
    /// Candidate dependency set: the signals read so far during this run.
    pub reads: IndexSet<SignalKey>,
}

/// The frame stack for one runtime.
pub(crate) struct Tracker {
    frames: Vec<Frame>,
}

impl Tracker {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn push(&mut self, computation: ComputationKey) {
        self.frames.push(Frame {
            computation,
            reads: IndexSet::new(),
        });
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// The innermost frame, i.e. the computation whose reads are being
    /// collected right now.
    pub fn current_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// Unwind frames up to and including the one for `computation`.
    ///
    /// Used when a run is torn down abnormally (a panicking task); the stack
    /// must be restored so later bookkeeping is never left partial.
    pub fn abandon(&mut self, computation: ComputationKey) {
        while let Some(frame) = self.frames.pop() {
            if frame.computation == computation {
                break;
            }
        }
    }
}
