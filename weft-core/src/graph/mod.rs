//! Dependency graph.
//!
//! Two generational arenas — one per entity kind — plus the edge relation
//! between them, stored symmetrically: each signal node carries its
//! subscriber set, each computation node its dependency set. The two sides
//! are only ever mutated together, inside the runtime's single critical
//! section, so a reader can never observe half an edge.
//!
//! Arena keys are stable and generational: a disposed entity's slot may be
//! reused, but stale keys held by old handles can never alias the new
//! occupant.

pub mod node;
pub mod scheduler;

use indexmap::IndexSet;
use slotmap::SlotMap;

use node::{ComputationKey, ComputationNode, SignalKey, SignalNode};

/// The bipartite signal/computation graph.
pub struct DepGraph {
    pub(crate) signals: SlotMap<SignalKey, SignalNode>,
    pub(crate) computations: SlotMap<ComputationKey, ComputationNode>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self {
            signals: SlotMap::with_key(),
            computations: SlotMap::with_key(),
        }
    }

    pub fn insert_signal(&mut self, node: SignalNode) -> SignalKey {
        self.signals.insert(node)
    }

    pub fn insert_computation(&mut self, node: ComputationNode) -> ComputationKey {
        self.computations.insert(node)
    }

    /// Replace a computation's dependency set, applying the symmetric
    /// difference against the old set to both sides of the relation.
    ///
    /// Signals disposed during the run are dropped from the new set: no edge
    /// — on either side — may reference a dead entity.
    pub fn set_dependencies(&mut self, key: ComputationKey, mut new_deps: IndexSet<SignalKey>) {
        new_deps.retain(|signal| self.signals.contains_key(*signal));
        let old = match self.computations.get(key) {
            Some(node) => node.dependencies.clone(),
            None => return,
        };

        for signal in old.difference(&new_deps) {
            if let Some(node) = self.signals.get_mut(*signal) {
                node.subscribers.shift_remove(&key);
            }
        }
        for signal in new_deps.difference(&old) {
            if let Some(node) = self.signals.get_mut(*signal) {
                node.subscribers.insert(key);
            }
        }

        if let Some(node) = self.computations.get_mut(key) {
            node.dependencies = new_deps;
        }
    }

    /// Remove a signal and every edge touching it.
    pub fn remove_signal(&mut self, key: SignalKey) {
        if let Some(node) = self.signals.remove(key) {
            for comp in node.subscribers {
                if let Some(c) = self.computations.get_mut(comp) {
                    c.dependencies.shift_remove(&key);
                }
            }
        }
    }

    /// Remove a computation and every edge touching it. Returns the removed
    /// node so the caller can fan out to an owned output signal.
    pub fn remove_computation(&mut self, key: ComputationKey) -> Option<ComputationNode> {
        let node = self.computations.remove(key)?;
        for signal in &node.dependencies {
            if let Some(s) = self.signals.get_mut(*signal) {
                s.subscribers.shift_remove(&key);
            }
        }
        Some(node)
    }
}

impl Default for DepGraph {
    fn default() -> Self {
        Self::new()
    }
}
