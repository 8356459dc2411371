//! Effect handles.
//!
//! An effect is a side-effecting computation: it produces no value, it exists
//! to push reactive state at the outside world — the rendering layer patching
//! a tree, a logger, a persistence hook. It runs once when created, then once
//! per flush in which any signal it read has changed.
//!
//! Dropping the handle does not stop the effect; lifetimes are explicit.
//! Call [`Effect::dispose`] (the unmount path of the hosting layer) to
//! guarantee no further invocation.

use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};

use crate::error::{Entity, Result, RuntimeError};
use crate::graph::node::ComputationKey;

use super::runtime::RuntimeInner;

/// A side-effecting computation.
///
/// Created with [`Runtime::create_effect`](super::Runtime::create_effect).
/// Clones share the same computation.
pub struct Effect {
    runtime: Weak<RuntimeInner>,
    key: ComputationKey,
}

impl Effect {
    pub(crate) fn from_parts(runtime: Weak<RuntimeInner>, key: ComputationKey) -> Self {
        Self { runtime, key }
    }

    fn inner(&self) -> Result<Arc<RuntimeInner>> {
        self.runtime
            .upgrade()
            .ok_or(RuntimeError::UseAfterDispose {
                entity: Entity::Runtime,
            })
    }

    /// How many times the effect has completed a run.
    pub fn run_count(&self) -> Result<u64> {
        self.inner()?.computation_run_count(self.key)
    }

    /// How many signals the last completed run read.
    pub fn dependency_count(&self) -> Result<usize> {
        self.inner()?.computation_dependency_count(self.key)
    }

    /// Remove the effect from the graph: it is dequeued if pending and will
    /// never run again. Idempotent. Fails with
    /// [`RuntimeError::InvalidState`] if called from inside the effect's own
    /// run.
    pub fn dispose(&self) -> Result<()> {
        match self.runtime.upgrade() {
            Some(inner) => inner.dispose_computation(self.key),
            None => Ok(()),
        }
    }

    pub fn is_disposed(&self) -> bool {
        match self.runtime.upgrade() {
            Some(inner) => !inner.computation_alive(self.key),
            None => true,
        }
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            key: self.key,
        }
    }
}

impl Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("key", &self.key)
            .field("run_count", &self.run_count().ok())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
