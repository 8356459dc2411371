//! Memo handles.
//!
//! A memo is a derived value: a computation that owns an output signal and
//! rewrites it at the end of each successful run. Other computations depend
//! on the output exactly as they would on a plain signal.
//!
//! # Recomputation
//!
//! The initial value is computed eagerly at creation, which also establishes
//! the memo's first dependency set. After that, invalidation queues the memo
//! like any other computation — but a read of a stale memo does not wait for
//! the flush: it recomputes synchronously before returning, so a value
//! observed mid-batch, or through a dependency taken for the first time
//! mid-flush, is never stale.
//!
//! # Quiet outputs
//!
//! The output write goes through the signal equality gate. A recomputation
//! that produces an equal value does not bump the output's version and does
//! not invalidate the memo's own subscribers — deep derivation chains only
//! propagate as far as values actually change.

use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};

use crate::error::{Entity, Result, RuntimeError};
use crate::graph::node::{ComputationKey, SignalKey};

use super::runtime::RuntimeInner;
use super::signal::SignalCell;

/// A derived reactive value.
///
/// Created with [`Runtime::create_memo`](super::Runtime::create_memo).
/// Clones share the same computation and output cell.
pub struct Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    runtime: Weak<RuntimeInner>,
    computation: ComputationKey,
    output: SignalKey,
    cell: Arc<SignalCell<T>>,
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn from_parts(
        runtime: Weak<RuntimeInner>,
        computation: ComputationKey,
        output: SignalKey,
        cell: Arc<SignalCell<T>>,
    ) -> Self {
        Self {
            runtime,
            computation,
            output,
            cell,
        }
    }

    fn inner(&self) -> Result<Arc<RuntimeInner>> {
        self.runtime
            .upgrade()
            .ok_or(RuntimeError::UseAfterDispose {
                entity: Entity::Runtime,
            })
    }

    /// Read the memo's value, recomputing first if it is stale.
    ///
    /// Inside a running computation this registers the memo's output as a
    /// dependency, exactly like reading a plain signal.
    pub fn get(&self) -> Result<T> {
        let inner = self.inner()?;
        if !inner.computation_alive(self.computation) {
            return Err(RuntimeError::UseAfterDispose {
                entity: Entity::Computation,
            });
        }
        inner.ensure_fresh(self.computation)?;
        inner.track_signal_read(self.output)?;
        Ok(self.cell.value.read().clone())
    }

    /// Read the memo's value without registering a dependency. Still
    /// recomputes first if stale.
    pub fn get_untracked(&self) -> Result<T> {
        let inner = self.inner()?;
        if !inner.computation_alive(self.computation) {
            return Err(RuntimeError::UseAfterDispose {
                entity: Entity::Computation,
            });
        }
        inner.ensure_fresh(self.computation)?;
        inner.check_signal(self.output)?;
        Ok(self.cell.value.read().clone())
    }

    /// How many times the output value has changed.
    pub fn version(&self) -> Result<u64> {
        self.inner()?.signal_version(self.output)
    }

    /// Remove the memo — computation and owned output signal — from the
    /// graph. Idempotent.
    pub fn dispose(&self) -> Result<()> {
        match self.runtime.upgrade() {
            Some(inner) => inner.dispose_computation(self.computation),
            None => Ok(()),
        }
    }

    pub fn is_disposed(&self) -> bool {
        match self.runtime.upgrade() {
            Some(inner) => !inner.computation_alive(self.computation),
            None => true,
        }
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            computation: self.computation,
            output: self.output,
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("computation", &self.computation)
            .field("value", &*self.cell.value.read())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
