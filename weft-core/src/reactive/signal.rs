//! Signal handles.
//!
//! A signal is the fundamental reactive primitive: a versioned cell holding
//! one value, plus the set of computations that read it. Reads made inside a
//! running computation register a dependency automatically; committed writes
//! invalidate exactly the computations that read the old value.
//!
//! # Change detection
//!
//! Every signal carries an equality comparator (`PartialEq` by default).
//! A write whose new value compares equal to the current one is a complete
//! no-op: no version bump, no invalidation, no flush. This is also what keeps
//! long derivation chains quiet — a memo whose recomputed output is unchanged
//! stops the wave right there.
//!
//! # Storage
//!
//! The typed value lives in a cell shared by all clones of the handle and by
//! the owning runtime's tasks; the graph node holds only bookkeeping. The
//! handle keeps a weak reference to its runtime, so dropping the runtime
//! invalidates every handle instead of leaking the graph.

use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::error::{Entity, Result, RuntimeError};
use crate::graph::node::SignalKey;

use super::runtime::RuntimeInner;

/// Typed storage behind a signal handle.
pub(crate) struct SignalCell<T> {
    pub(crate) value: RwLock<T>,
    pub(crate) equals: Box<dyn Fn(&T, &T) -> bool + Send + Sync>,
}

impl<T> SignalCell<T> {
    pub(crate) fn new<E>(value: T, equals: E) -> Self
    where
        E: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self {
            value: RwLock::new(value),
            equals: Box::new(equals),
        }
    }
}

/// A reactive value cell.
///
/// Clones share the same cell and graph node. Created with
/// [`Runtime::create_signal`](super::Runtime::create_signal).
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    runtime: Weak<RuntimeInner>,
    key: SignalKey,
    cell: Arc<SignalCell<T>>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn from_parts(
        runtime: Weak<RuntimeInner>,
        key: SignalKey,
        cell: Arc<SignalCell<T>>,
    ) -> Self {
        Self { runtime, key, cell }
    }

    fn inner(&self) -> Result<Arc<RuntimeInner>> {
        self.runtime
            .upgrade()
            .ok_or(RuntimeError::UseAfterDispose {
                entity: Entity::Runtime,
            })
    }

    /// Read the current value.
    ///
    /// Inside a running computation this registers the signal as a
    /// dependency; outside one it is a plain read with no side effect.
    pub fn get(&self) -> Result<T> {
        let inner = self.inner()?;
        inner.track_signal_read(self.key)?;
        Ok(self.cell.value.read().clone())
    }

    /// Read the current value without registering a dependency.
    pub fn get_untracked(&self) -> Result<T> {
        let inner = self.inner()?;
        inner.check_signal(self.key)?;
        Ok(self.cell.value.read().clone())
    }

    /// Write a new value.
    ///
    /// Returns `Ok(false)` when the comparator considers the value unchanged
    /// (nothing happens at all). Otherwise the value commits, the version
    /// bumps, every subscriber is queued, and — outside a batch — the queue
    /// flushes before this returns. Dependents are never executed from
    /// inside the write notification itself.
    pub fn set(&self, value: T) -> Result<bool> {
        let inner = self.inner()?;
        inner.write_signal(self.key, &self.cell, value)
    }

    /// Compute a new value from the current one and write it through the
    /// same equality gate as [`set`](Self::set).
    pub fn update<F>(&self, f: F) -> Result<bool>
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let current = self.cell.value.read();
            f(&current)
        };
        self.set(new_value)
    }

    /// How many times this signal's value has changed.
    pub fn version(&self) -> Result<u64> {
        self.inner()?.signal_version(self.key)
    }

    /// How many computations currently depend on this signal.
    pub fn subscriber_count(&self) -> Result<usize> {
        self.inner()?.signal_subscriber_count(self.key)
    }

    /// Remove this signal from the graph. Idempotent: disposing an already
    /// disposed signal (or one whose runtime is gone) is a no-op.
    pub fn dispose(&self) -> Result<()> {
        match self.runtime.upgrade() {
            Some(inner) => inner.dispose_signal(self.key),
            None => Ok(()),
        }
    }

    pub fn is_disposed(&self) -> bool {
        match self.runtime.upgrade() {
            Some(inner) => !inner.signal_alive(self.key),
            None => true,
        }
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            key: self.key,
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("key", &self.key)
            .field("value", &*self.cell.value.read())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
